//! Deterministic tenant identity.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
};

use crate::error::{Error, Result};

/// Hex characters kept from the digest.
pub const TENANT_ID_LEN: usize = 8;

/// Stable tenant identifier derived one-way from a contact identifier.
///
/// Used as the registry key and as the tenant's credentials directory name,
/// so raw phone numbers never show up in paths or logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Hash a contact identifier (e.g. a phone number) into its tenant id.
    pub fn from_contact(contact: &str) -> Self {
        let digest = Sha256::digest(contact.as_bytes());
        let mut id = String::with_capacity(TENANT_ID_LEN);
        for byte in digest.iter().take(TENANT_ID_LEN.div_ceil(2)) {
            id.push_str(&format!("{byte:02x}"));
        }
        id.truncate(TENANT_ID_LEN);
        Self(id)
    }

    /// Accept an id read back from storage (directory name, database row).
    ///
    /// Only checks that the value is a safe single path segment: tenants
    /// created by older deployments may not match the current hash length.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidTenantId {
            value: value.to_string(),
            reason,
        };
        if value.is_empty() {
            return Err(invalid("empty"));
        }
        if value == "." || value == ".." {
            return Err(invalid("relative path component"));
        }
        if value
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(invalid("not a single path segment"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}
