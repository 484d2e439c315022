//! Shared types, error definitions, and small utilities used across the
//! switchboard crates.

pub mod error;
pub mod types;

pub use error::{Error, FromMessage, Result};

/// Seconds since the unix epoch, saturating to zero on clock skew.
#[must_use]
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
