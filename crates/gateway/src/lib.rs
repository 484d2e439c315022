//! Gateway: HTTP surface, tenant configuration store and pipeline wiring
//! around the session registry.
//!
//! Lifecycle:
//! 1. Open SQLite and run migrations
//! 2. Build the registry with the sidecar connection factory and the webhook
//!    turn handler
//! 3. Auto-load every tenant found under the credentials root
//! 4. Serve HTTP (health, session create/pause/resume/status/qr)
//! 5. On Ctrl-C stop the sweeper and shut every session down

pub mod server;
pub mod sweeper;
pub mod tenant_store;
pub mod turn;

pub use {
    server::{AppState, build_gateway_app, start_gateway},
    tenant_store::SqliteTenantConfigStore,
    turn::WebhookTurnHandler,
};

/// Run database migrations for the gateway's tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
