//! Message payloads exchanged between a network connection, the session
//! core, and the response pipeline.

use serde::{Deserialize, Serialize};

/// Message kind used for plain text messages.
pub const KIND_CHAT: &str = "chat";

/// A single message observed on a tenant's connection.
///
/// The session core never mutates a message; it only batches and reorders
/// owned values on their way to the turn handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Network-assigned message id.
    pub id: String,
    /// Conversation the message belongs to (network JID).
    pub chat_id: String,
    /// Raw sender address as reported by the network.
    pub sender_id: String,
    /// Display name advertised by the sender, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Unix timestamp (seconds) reported by the network.
    pub timestamp: i64,
    #[serde(default)]
    pub body: String,
    /// Network message type (`chat`, `image`, `ptt`, ...).
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub has_media: bool,
    /// Sent by the tenant's own account.
    #[serde(default)]
    pub from_me: bool,
}

fn default_kind() -> String {
    KIND_CHAT.to_string()
}

impl InboundMessage {
    /// Build a plain text message, mostly useful for tests and tooling.
    pub fn text(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            id: String::new(),
            chat_id: sender_id.clone(),
            sender_id,
            sender_name: None,
            timestamp: crate::unix_now(),
            body: body.into(),
            kind: default_kind(),
            has_media: false,
            from_me: false,
        }
    }
}

/// Payload sent back through a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Media {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
