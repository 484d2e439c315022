//! Per-tenant configuration as seen by the session core.

use std::{collections::HashMap, time::Duration};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::sync::RwLock,
};

use crate::{
    error::{Error, Result},
    tenant::TenantId,
};

/// Debounce used when neither the tenant nor the gateway sets one.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// The slice of tenant configuration the core depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub is_paused: bool,
    /// Quiet period after which a sender's buffered burst becomes a turn.
    pub debounce_ms: u64,
    /// Pipeline-owned settings, opaque to the core.
    pub settings: serde_json::Value,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            is_paused: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            settings: serde_json::Value::Object(Default::default()),
        }
    }
}

impl TenantConfig {
    pub fn with_debounce_ms(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }

    pub fn apply(&mut self, patch: &TenantConfigPatch) {
        if let Some(paused) = patch.is_paused {
            self.is_paused = paused;
        }
        if let Some(ms) = patch.debounce_ms {
            self.debounce_ms = ms;
        }
        if let Some(settings) = &patch.settings {
            self.settings = settings.clone();
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl TenantConfigPatch {
    pub fn paused(is_paused: bool) -> Self {
        Self {
            is_paused: Some(is_paused),
            ..Self::default()
        }
    }
}

/// External store of tenant configuration.
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    /// Unknown tenants are a configuration error.
    async fn get_tenant_config(&self, tenant_id: &TenantId) -> Result<TenantConfig>;

    async fn set_tenant_config(&self, tenant_id: &TenantId, patch: TenantConfigPatch)
    -> Result<()>;

    /// Create the tenant's configuration if missing. Existing configuration
    /// is left untouched.
    async fn ensure_tenant(&self, tenant_id: &TenantId, defaults: TenantConfig) -> Result<()>;
}

/// Map-backed provider for tests and embedders without a database.
#[derive(Default)]
pub struct InMemoryTenantConfigProvider {
    configs: RwLock<HashMap<TenantId, TenantConfig>>,
}

impl InMemoryTenantConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tenant_id: TenantId, config: TenantConfig) {
        self.configs.write().await.insert(tenant_id, config);
    }

    pub async fn snapshot(&self, tenant_id: &TenantId) -> Option<TenantConfig> {
        self.configs.read().await.get(tenant_id).cloned()
    }
}

#[async_trait]
impl TenantConfigProvider for InMemoryTenantConfigProvider {
    async fn get_tenant_config(&self, tenant_id: &TenantId) -> Result<TenantConfig> {
        self.configs
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| Error::config(tenant_id, "no configuration stored"))
    }

    async fn set_tenant_config(
        &self,
        tenant_id: &TenantId,
        patch: TenantConfigPatch,
    ) -> Result<()> {
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(tenant_id)
            .ok_or_else(|| Error::config(tenant_id, "no configuration stored"))?;
        config.apply(&patch);
        Ok(())
    }

    async fn ensure_tenant(&self, tenant_id: &TenantId, defaults: TenantConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .entry(tenant_id.clone())
            .or_insert(defaults);
        Ok(())
    }
}
