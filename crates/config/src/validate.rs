use std::path::PathBuf;

use crate::schema::SwitchboardConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. `sessions.default_debounce_ms`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Check semantic constraints the schema cannot express.
pub fn validate(config: &SwitchboardConfig, config_path: Option<PathBuf>) -> ValidationResult {
    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path,
    };

    if config.server.port == 0 {
        result.push(Severity::Error, "server.port", "port must be non-zero");
    }
    if config.server.bind.trim().is_empty() {
        result.push(Severity::Error, "server.bind", "bind address is empty");
    }

    let sessions = &config.sessions;
    if sessions.default_debounce_ms == 0 {
        result.push(
            Severity::Error,
            "sessions.default_debounce_ms",
            "debounce must be at least 1ms",
        );
    } else if sessions.default_debounce_ms > 60_000 {
        result.push(
            Severity::Warning,
            "sessions.default_debounce_ms",
            "debounce above one minute delays every reply",
        );
    }
    if let Some(root) = &sessions.root
        && root.as_os_str().is_empty()
    {
        result.push(Severity::Error, "sessions.root", "root path is empty");
    }
    for name in &sessions.reserved_dirs {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            result.push(
                Severity::Error,
                "sessions.reserved_dirs",
                format!("'{name}' is not a single directory name"),
            );
        }
    }
    if sessions.sweep_interval_secs > 0 && sessions.idle_reclaim_secs == 0 {
        result.push(
            Severity::Warning,
            "sessions.idle_reclaim_secs",
            "idle aggregators are reclaimed on every sweep",
        );
    }

    if !config.sidecar.url.starts_with("ws://") && !config.sidecar.url.starts_with("wss://") {
        result.push(
            Severity::Error,
            "sidecar.url",
            "sidecar url must use ws:// or wss://",
        );
    }

    match &config.pipeline.url {
        None => result.push(
            Severity::Warning,
            "pipeline.url",
            "no pipeline configured, turns will not be answered",
        ),
        Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => result.push(
            Severity::Error,
            "pipeline.url",
            "pipeline url must use http:// or https://",
        ),
        Some(_) => {},
    }

    result
}
