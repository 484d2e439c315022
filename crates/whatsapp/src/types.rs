//! JSON frames exchanged with the bridge sidecar.

use {
    serde::{Deserialize, Serialize},
    switchboard_channels::ConnectionEvent,
    switchboard_common::types::{InboundMessage, KIND_CHAT, OutboundPayload},
};

/// Frames sent from the gateway to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Start (or restore) an account from the credentials in `auth_dir`.
    Login { account_id: String, auth_dir: String },
    /// Close the account's browser session. Credentials stay on disk.
    Close { account_id: String },
    Send {
        request_id: String,
        account_id: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl GatewayMessage {
    pub fn send(
        request_id: impl Into<String>,
        account_id: impl Into<String>,
        to: impl Into<String>,
        payload: &OutboundPayload,
    ) -> Self {
        let (text, media_url, caption) = match payload {
            OutboundPayload::Text { text } => (Some(text.clone()), None, None),
            OutboundPayload::Media { url, caption } => (None, Some(url.clone()), caption.clone()),
        };
        Self::Send {
            request_id: request_id.into(),
            account_id: account_id.into(),
            to: to.into(),
            text,
            media_url,
            caption,
        }
    }
}

/// Frames sent from the sidecar to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    Qr {
        account_id: String,
        qr: String,
    },
    Connected {
        account_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        account_id: String,
        #[serde(default)]
        reason: String,
    },
    LoggedOut {
        account_id: String,
    },
    /// A message received from someone else.
    InboundMessage {
        account_id: String,
        #[serde(flatten)]
        message: WireMessage,
    },
    /// Any message created on the account, including ones the owner sent
    /// from their phone.
    MessageCreated {
        account_id: String,
        #[serde(flatten)]
        message: WireMessage,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        account_id: Option<String>,
        error: String,
    },
}

impl SidecarMessage {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Qr { account_id, .. }
            | Self::Connected { account_id, .. }
            | Self::Disconnected { account_id, .. }
            | Self::LoggedOut { account_id }
            | Self::InboundMessage { account_id, .. }
            | Self::MessageCreated { account_id, .. } => Some(account_id),
            Self::Error { account_id, .. } => account_id.as_deref(),
            Self::SendResult { .. } => None,
        }
    }

    /// The connection event this frame means for its account, if any.
    pub fn into_event(self) -> Option<(String, ConnectionEvent)> {
        match self {
            Self::Qr { account_id, qr } => Some((account_id, ConnectionEvent::PairingPrompt(qr))),
            Self::Connected { account_id, .. } => Some((account_id, ConnectionEvent::Ready)),
            Self::Disconnected { account_id, reason } => {
                Some((account_id, ConnectionEvent::Disconnected { reason }))
            },
            Self::LoggedOut { account_id } => Some((account_id, ConnectionEvent::Disconnected {
                reason: "logged out".into(),
            })),
            Self::InboundMessage {
                account_id,
                message,
            } => Some((account_id, ConnectionEvent::Message(message.into()))),
            Self::MessageCreated {
                account_id,
                message,
            } if message.from_me => Some((
                account_id,
                ConnectionEvent::OutgoingObserved(message.into()),
            )),
            Self::MessageCreated { .. } | Self::SendResult { .. } | Self::Error { .. } => None,
        }
    }
}

/// A message as the sidecar reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub message_id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub timestamp: i64,
}

fn default_message_type() -> String {
    KIND_CHAT.into()
}

impl From<WireMessage> for InboundMessage {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: wire.message_id,
            chat_id: wire.chat_jid,
            sender_id: wire.sender_jid,
            sender_name: wire.sender_name,
            timestamp: wire.timestamp,
            body: wire.body,
            kind: wire.message_type,
            has_media: wire.has_media,
            from_me: wire.from_me,
        }
    }
}
