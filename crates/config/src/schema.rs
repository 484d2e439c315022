use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub database: DatabaseConfig,
    pub sidecar: SidecarConfig,
    pub pipeline: PipelineConfig,
    pub gating: GatingConfig,
}

impl SwitchboardConfig {
    /// Directory holding one credentials directory per tenant.
    pub fn sessions_root(&self, data_dir: &Path) -> PathBuf {
        self.sessions
            .root
            .clone()
            .unwrap_or_else(|| data_dir.join("sessions"))
    }

    /// SQLite URL for the tenant configuration store.
    pub fn database_url(&self, data_dir: &Path) -> String {
        self.database.url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}?mode=rwc",
                data_dir.join("switchboard.db").display()
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Session lifecycle and aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Credentials root. Defaults to `<data_dir>/sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Directory names under the root that are not tenants.
    pub reserved_dirs: Vec<String>,
    /// Debounce window for tenants whose configuration does not set one.
    pub default_debounce_ms: u64,
    /// How often idle sender aggregators are reclaimed (0 disables).
    pub sweep_interval_secs: u64,
    /// Minimum idle time before an aggregator is reclaimed.
    pub idle_reclaim_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: None,
            reserved_dirs: vec!["session".into(), ".wwebjs_cache".into()],
            default_debounce_ms: 1500,
            sweep_interval_secs: 300,
            idle_reclaim_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `sqlite://<data_dir>/switchboard.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// WhatsApp Web bridge sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub url: String,
    pub connect_retries: u32,
    pub send_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9876".into(),
            connect_retries: 10,
            send_timeout_secs: 30,
        }
    }
}

/// Response pipeline that receives coalesced turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Webhook URL. Turns are logged and dropped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 60,
        }
    }
}

/// Inbound message filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    pub ignored_contacts: Vec<String>,
    pub ignore_groups: bool,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            ignored_contacts: vec!["status@broadcast".into(), "0@c.us".into()],
            ignore_groups: true,
        }
    }
}
