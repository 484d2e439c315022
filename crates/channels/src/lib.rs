//! Connection seam between the session core and a messaging network.
//!
//! A network backend implements [`ConnectionHandle`] for one tenant and a
//! [`ConnectionFactory`] that builds handles. Network callbacks are turned
//! into [`ConnectionEvent`]s on an unbounded channel owned by the session.

pub mod connection;
pub mod error;
pub mod gating;

pub use {
    connection::{ConnectionEvent, ConnectionFactory, ConnectionHandle, EventReceiver, EventSender},
    error::{Error, Result},
    gating::{GateDecision, GateRejection, InboundGate},
};
