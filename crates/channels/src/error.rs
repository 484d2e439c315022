use std::error::Error as StdError;

/// Crate-wide result type for connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed connection errors shared by every network backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid connection input: {message}")]
    InvalidInput { message: String },

    /// The connection has not been initialized or was destroyed.
    #[error("connection not ready: {message}")]
    NotReady { message: String },

    /// The network rejected or failed the operation.
    #[error("connection operation failed: {message}")]
    Failed { message: String },

    /// Operation did not complete in time.
    #[error("connection operation timed out: {operation}")]
    Timeout { operation: String },

    /// Wrapped source error from an external dependency.
    #[error("connection operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_ready(message: impl std::fmt::Display) -> Self {
        Self::NotReady {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
