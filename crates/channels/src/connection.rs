use std::{path::Path, sync::Arc};

use {
    async_trait::async_trait,
    switchboard_common::types::{InboundMessage, OutboundPayload},
    tokio::sync::mpsc,
};

use crate::Result;

/// Events a connection reports back to its owning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A pairing artifact (QR payload) the tenant must scan.
    PairingPrompt(String),
    /// The connection is authenticated and can send/receive.
    Ready,
    /// The network dropped the connection.
    Disconnected { reason: String },
    /// A message from a remote party.
    Message(InboundMessage),
    /// A message sent from the tenant's own account (any device).
    OutgoingObserved(InboundMessage),
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// One tenant's connection to the messaging network.
///
/// Exclusively owned by a single session. `initialize` may be called again
/// after `destroy`; cached credentials under `credentials_path` make the
/// second call skip pairing.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    async fn initialize(&self, credentials_path: &Path) -> Result<()>;

    /// Tear down the connection and release network resources.
    async fn destroy(&self) -> Result<()>;

    async fn send(&self, recipient: &str, payload: &OutboundPayload) -> Result<()>;
}

/// Builds connection handles for tenants.
pub trait ConnectionFactory: Send + Sync {
    /// Create an uninitialized connection that reports on `events`.
    fn create(&self, tenant_id: &str, events: EventSender) -> Arc<dyn ConnectionHandle>;
}
