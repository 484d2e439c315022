//! WhatsApp Web connections for switchboard.
//!
//! Talks to a WhatsApp Web bridge sidecar over one shared WebSocket. Every
//! tenant is an account on the sidecar; frames carry the account id and are
//! routed to the owning tenant's connection events.

pub mod connection;
pub mod sidecar;
pub mod types;

pub use {
    connection::{WhatsAppConnection, WhatsAppConnectionFactory},
    sidecar::{SidecarHandle, SidecarLink, SidecarSettings},
    types::{GatewayMessage, SidecarMessage, WireMessage},
};
