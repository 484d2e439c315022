use std::{path::Path, sync::Arc};

use {
    async_trait::async_trait,
    switchboard_channels::{
        ConnectionFactory, ConnectionHandle, Error, EventSender, Result,
    },
    switchboard_common::types::OutboundPayload,
    tracing::{debug, info},
};

use crate::{
    sidecar::{SidecarLink, SidecarSettings},
    types::GatewayMessage,
};

/// One tenant's account on the sidecar.
pub struct WhatsAppConnection {
    account_id: String,
    events: EventSender,
    link: Arc<SidecarLink>,
}

impl WhatsAppConnection {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

#[async_trait]
impl ConnectionHandle for WhatsAppConnection {
    async fn initialize(&self, credentials_path: &Path) -> Result<()> {
        let sidecar = self.link.ensure_connected().await?;
        sidecar.send(&GatewayMessage::Login {
            account_id: self.account_id.clone(),
            auth_dir: credentials_path.display().to_string(),
        })?;
        info!(account_id = %self.account_id, "requested whatsapp login");
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        // Without a sidecar there is no browser session left to close.
        let Some(sidecar) = self.link.connected().await else {
            debug!(account_id = %self.account_id, "sidecar not connected, nothing to close");
            return Ok(());
        };
        sidecar.send(&GatewayMessage::Close {
            account_id: self.account_id.clone(),
        })?;
        info!(account_id = %self.account_id, "requested whatsapp close");
        Ok(())
    }

    async fn send(&self, recipient: &str, payload: &OutboundPayload) -> Result<()> {
        if recipient.is_empty() {
            return Err(Error::invalid_input("recipient is empty"));
        }
        let sidecar = self
            .link
            .connected()
            .await
            .ok_or_else(|| Error::not_ready("sidecar not connected"))?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let message = GatewayMessage::send(&request_id, &self.account_id, recipient, payload);
        sidecar
            .request(&request_id, &message, self.link.settings().send_timeout)
            .await
    }
}

impl Drop for WhatsAppConnection {
    fn drop(&mut self) {
        self.link.unregister(&self.account_id, &self.events);
    }
}

/// Builds [`WhatsAppConnection`]s that share one sidecar link.
pub struct WhatsAppConnectionFactory {
    link: Arc<SidecarLink>,
}

impl WhatsAppConnectionFactory {
    pub fn new(settings: SidecarSettings) -> Self {
        Self {
            link: Arc::new(SidecarLink::new(settings)),
        }
    }

    pub fn link(&self) -> &Arc<SidecarLink> {
        &self.link
    }
}

impl ConnectionFactory for WhatsAppConnectionFactory {
    fn create(&self, tenant_id: &str, events: EventSender) -> Arc<dyn ConnectionHandle> {
        self.link.register(tenant_id, events.clone());
        Arc::new(WhatsAppConnection {
            account_id: tenant_id.to_string(),
            events,
            link: Arc::clone(&self.link),
        })
    }
}
