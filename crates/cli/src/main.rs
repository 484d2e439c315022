mod config_commands;
mod sessions_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    switchboard_sessions::TenantId,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard, multi-tenant chat automation gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (searched before ./ and ~/.config/switchboard/).
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory for credentials and the database.
    #[arg(long, global = true, env = "SWITCHBOARD_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Print the tenant id derived from a contact identifier.
    TenantId {
        /// Phone number or other contact identifier.
        contact: String,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Session management.
    Sessions {
        #[command(subcommand)]
        action: sessions_commands::SessionsAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config_dir = cli.config_dir.as_deref();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(switchboard_config::default_data_dir);

    match cli.command {
        // Default: start gateway when no subcommand is provided
        None | Some(Commands::Gateway) => {
            info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");
            let mut config = switchboard_config::discover_and_load(config_dir);

            // CLI args override config values
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }

            let validation = switchboard_config::validate(&config, None);
            for d in &validation.diagnostics {
                warn!(path = %d.path, severity = %d.severity, "{}", d.message);
            }
            if validation.has_errors() {
                anyhow::bail!("invalid configuration, run `switchboard config check`");
            }

            switchboard_gateway::start_gateway(config, &data_dir).await
        },
        Some(Commands::TenantId { contact }) => {
            println!("{}", TenantId::from_contact(&contact));
            Ok(())
        },
        Some(Commands::Config { action }) => config_commands::handle_config(action, config_dir),
        Some(Commands::Sessions { action }) => {
            sessions_commands::handle_sessions(action, config_dir, &data_dir).await
        },
    }
}
