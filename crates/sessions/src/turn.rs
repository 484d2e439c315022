//! Seams to the response pipeline: the turn handler and the outgoing
//! message observer.

use std::sync::Arc;

use {
    async_trait::async_trait,
    switchboard_channels::ConnectionHandle,
    switchboard_common::types::InboundMessage,
};

use crate::tenant::TenantId;

/// What a turn handler gets to know about the session it answers for.
pub struct SessionContext {
    pub tenant_id: TenantId,
    /// Connection to reply through. Shared with the owning session only.
    pub connection: Arc<dyn ConnectionHandle>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Failure of a single turn. Logged by the aggregator, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("turn failed: {0}")]
    Failed(String),

    #[error("reply could not be sent: {0}")]
    Send(#[from] switchboard_channels::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TurnError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Produces and sends the reply for one coalesced batch of a sender's
/// messages.
///
/// Called at most once at a time per sender; calls for different senders run
/// concurrently. Returns once the reply has been sent.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn handle_turn(
        &self,
        session: &SessionContext,
        sender_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), TurnError>;
}

/// Receives messages the tenant sent from their own account.
#[async_trait]
pub trait OutgoingObserver: Send + Sync {
    async fn observe(&self, tenant_id: &TenantId, message: InboundMessage);
}
