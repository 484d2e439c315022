use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid tenant configuration. Fatal for that tenant only.
    #[error("configuration error for tenant {tenant_id}: {message}")]
    Config { tenant_id: String, message: String },

    /// Connection initialize/destroy failed.
    #[error("connection error for tenant {tenant_id}: {source}")]
    Connection {
        tenant_id: String,
        #[source]
        source: switchboard_channels::Error,
    },

    #[error("invalid tenant id '{value}': {reason}")]
    InvalidTenantId { value: String, reason: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn config(tenant_id: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Config {
            tenant_id: tenant_id.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection(
        tenant_id: impl std::fmt::Display,
        source: switchboard_channels::Error,
    ) -> Self {
        Self::Connection {
            tenant_id: tenant_id.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
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

impl switchboard_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

switchboard_common::impl_context!();
