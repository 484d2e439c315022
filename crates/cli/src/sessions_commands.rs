use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use switchboard_sessions::{CredentialsDirectory, TenantId, TenantSource};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List the tenants the gateway would auto-load at startup.
    List,
}

pub async fn handle_sessions(
    action: SessionsAction,
    config_dir: Option<&Path>,
    data_dir: &Path,
) -> Result<()> {
    match action {
        SessionsAction::List => {
            let config = switchboard_config::discover_and_load(config_dir);
            let scan = CredentialsDirectory::new(config.sessions_root(data_dir))
                .with_reserved(config.sessions.reserved_dirs.iter());
            let tenants = scan_tenants(&scan).await?;
            if tenants.is_empty() {
                println!("No sessions found under {}.", scan.root().display());
            } else {
                for tenant_id in &tenants {
                    println!("  {tenant_id}");
                }
            }
            Ok(())
        },
    }
}

async fn scan_tenants(scan: &CredentialsDirectory) -> Result<Vec<TenantId>> {
    Ok(scan.tenant_ids().await?)
}
