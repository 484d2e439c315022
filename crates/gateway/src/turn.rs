//! Turn handler that forwards coalesced batches to an HTTP pipeline.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    switchboard_common::types::{InboundMessage, OutboundPayload},
    switchboard_sessions::{SessionContext, TenantId, TurnError, TurnHandler},
    tracing::{debug, info},
};

#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    tenant_id: &'a TenantId,
    sender_id: &'a str,
    messages: &'a [InboundMessage],
}

#[derive(Debug, Default, Deserialize)]
struct TurnResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// Posts every turn to the pipeline webhook and sends back its reply.
pub struct WebhookTurnHandler {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookTurnHandler {
    /// With no `url`, turns are logged and dropped.
    pub fn new(url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

#[async_trait]
impl TurnHandler for WebhookTurnHandler {
    async fn handle_turn(
        &self,
        session: &SessionContext,
        sender_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), TurnError> {
        let Some(url) = self.url.as_deref() else {
            info!(
                tenant_id = %session.tenant_id,
                sender_id,
                messages = batch.len(),
                "no pipeline configured, dropping turn"
            );
            return Ok(());
        };

        let resp = self
            .client
            .post(url)
            .json(&TurnRequest {
                tenant_id: &session.tenant_id,
                sender_id,
                messages: &batch,
            })
            .send()
            .await
            .map_err(|e| TurnError::external("calling pipeline", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TurnError::failed(format!(
                "pipeline returned {status}: {body}"
            )));
        }

        let TurnResponse { reply } = resp
            .json()
            .await
            .map_err(|e| TurnError::external("decoding pipeline response", e))?;
        let Some(reply) = reply.filter(|r| !r.trim().is_empty()) else {
            debug!(tenant_id = %session.tenant_id, sender_id, "pipeline chose not to reply");
            return Ok(());
        };

        // Answer in the chat the burst ended in.
        let Some(chat_id) = batch.last().map(|m| m.chat_id.as_str()) else {
            return Err(TurnError::failed("empty batch"));
        };
        session
            .connection
            .send(chat_id, &OutboundPayload::text(reply))
            .await?;
        debug!(tenant_id = %session.tenant_id, sender_id, "reply sent");
        Ok(())
    }
}
