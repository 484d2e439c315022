//! Per-tenant session core.
//!
//! A [`SessionRegistry`] owns one [`SessionHandle`] per tenant. Each session
//! owns a connection to the messaging network and a [`SenderAggregator`] per
//! sender, which coalesces bursts of messages into single turns for the
//! response pipeline.

pub mod aggregator;
pub mod error;
pub mod provider;
pub mod registry;
pub mod scan;
pub mod session;
pub mod tenant;
pub mod turn;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;

pub use {
    aggregator::{AggregatorPhase, AggregatorSnapshot, SenderAggregator},
    error::{Error, Result},
    provider::{
        DEFAULT_DEBOUNCE_MS, InMemoryTenantConfigProvider, TenantConfig, TenantConfigPatch,
        TenantConfigProvider,
    },
    registry::{AutoLoadReport, RegistryOptions, SessionRegistry},
    scan::{CredentialsDirectory, DEFAULT_RESERVED_DIRS, TenantSource},
    session::{SessionHandle, SessionStatus},
    tenant::TenantId,
    turn::{OutgoingObserver, SessionContext, TurnError, TurnHandler},
};
