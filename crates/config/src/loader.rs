use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::SwitchboardConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchboard.toml",
    "switchboard.yaml",
    "switchboard.yml",
    "switchboard.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SwitchboardConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config.
///
/// Search order:
/// 1. `config_dir` when given (e.g. `--config-dir`)
/// 2. `./switchboard.{toml,yaml,yml,json}`
/// 3. the user config directory
///
/// Falls back to `SwitchboardConfig::default()` when nothing is found or the
/// file cannot be parsed.
pub fn discover_and_load(config_dir: Option<&Path>) -> SwitchboardConfig {
    let Some(path) = find_config_file(config_dir) else {
        debug!("no config file found, using defaults");
        return SwitchboardConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            SwitchboardConfig::default()
        },
    }
}

/// First existing config file in the standard locations.
pub fn find_config_file(config_dir: Option<&Path>) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(dir) = config_dir {
        dirs.push(dir.to_path_buf());
    }
    dirs.push(PathBuf::from("."));
    if let Some(dir) = self::config_dir() {
        dirs.push(dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// User-global config directory (`~/.config/switchboard/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.config_dir().to_path_buf())
}

/// Default data directory for credentials and the database.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "switchboard")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".switchboard"))
}

fn parse_config(raw: &str, path: &Path) -> Result<SwitchboardConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_err = |message: String| Error::Parse {
        path: path.to_path_buf(),
        message,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_err(e.to_string())),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
