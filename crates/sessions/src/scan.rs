//! Enumerating persisted tenants for the startup auto-load.

use std::path::{Path, PathBuf};

use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use crate::{error::Result, tenant::TenantId};

/// Directory names under the credentials root that never hold a tenant.
pub const DEFAULT_RESERVED_DIRS: [&str; 2] = ["session", ".wwebjs_cache"];

/// Source of tenant ids that have persisted state.
#[async_trait]
pub trait TenantSource: Send + Sync {
    async fn tenant_ids(&self) -> Result<Vec<TenantId>>;
}

#[async_trait]
impl TenantSource for Vec<TenantId> {
    async fn tenant_ids(&self) -> Result<Vec<TenantId>> {
        Ok(self.clone())
    }
}

/// One credentials directory per tenant under a fixed root.
#[derive(Debug, Clone)]
pub struct CredentialsDirectory {
    root: PathBuf,
    reserved: Vec<String>,
}

impl CredentialsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reserved: DEFAULT_RESERVED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_reserved<I, S>(mut self, reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = reserved.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.iter().any(|r| r == name)
    }
}

#[async_trait]
impl TenantSource for CredentialsDirectory {
    async fn tenant_ids(&self) -> Result<Vec<TenantId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "credentials root does not exist yet");
                return Ok(Vec::new());
            },
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!(path = %entry.path().display(), "skipping non-utf8 credentials directory");
                continue;
            };
            if self.is_reserved(name) {
                debug!(name, "skipping reserved directory");
                continue;
            }
            match TenantId::parse(name) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(name, error = %e, "skipping credentials directory"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
