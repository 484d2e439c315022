//! Gateway configuration: schema, discovery, env substitution, validation.
//!
//! Config files: `switchboard.toml`, `switchboard.yaml`, `switchboard.yml`
//! or `switchboard.json`, searched in `./` then the user config directory.
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, default_data_dir, discover_and_load, find_config_file, load_config},
    schema::{
        DatabaseConfig, GatingConfig, PipelineConfig, ServerConfig, SessionsConfig,
        SidecarConfig, SwitchboardConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
