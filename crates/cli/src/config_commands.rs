use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use switchboard_config::{Severity, SwitchboardConfig, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check,
    /// Print the effective configuration as JSON.
    Show,
}

pub fn handle_config(action: ConfigAction, config_dir: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(config_dir),
        ConfigAction::Show => {
            let config = switchboard_config::discover_and_load(config_dir);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Load the discovered file strictly (parse errors are reported, not
/// replaced by defaults) and validate it.
fn load_and_validate(config_dir: Option<&Path>) -> ValidationResult {
    let Some(path) = switchboard_config::find_config_file(config_dir) else {
        return switchboard_config::validate(&SwitchboardConfig::default(), None);
    };
    match switchboard_config::load_config(&path) {
        Ok(config) => switchboard_config::validate(&config, Some(path)),
        Err(e) => ValidationResult {
            diagnostics: vec![switchboard_config::Diagnostic {
                severity: Severity::Error,
                path: String::new(),
                message: e.to_string(),
            }],
            config_path: Some(path),
        },
    }
}

fn check(config_dir: Option<&Path>) -> Result<()> {
    let result = load_and_validate(config_dir);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
    }

    let errors = count(&result, Severity::Error);
    let warnings = count(&result, Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn count(result: &ValidationResult, severity: Severity) -> usize {
    result
        .diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .count()
}
