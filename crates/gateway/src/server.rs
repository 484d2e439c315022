use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Path as UrlPath, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    serde_json::json,
    switchboard_channels::InboundGate,
    switchboard_config::SwitchboardConfig,
    switchboard_sessions::{
        CredentialsDirectory, Error as SessionError, RegistryOptions, SessionRegistry, TenantId,
    },
    switchboard_whatsapp::{SidecarSettings, WhatsAppConnectionFactory},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{sweeper::spawn_sweeper, tenant_store::SqliteTenantConfigStore, turn::WebhookTurnHandler};

pub const NO_QR_NEEDED: &str = "Client is already authenticated. No QR code is needed.";
pub const QR_NOT_READY: &str = "QR code is not generated yet. Please reload this page.";
pub const SESSION_NOT_FOUND: &str = "Session not found. Create the session first.";

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/sessions/{phone}", post(create_session_handler))
        .route("/api/sessions/{phone}/pause", post(pause_session_handler))
        .route("/api/sessions/{phone}/resume", post(resume_session_handler))
        .route("/api/sessions/{phone}/status", get(session_status_handler))
        .route("/api/sessions/{phone}/qr", get(qr_handler))
        .with_state(state)
}

/// Wire the store, the sidecar connection factory and the pipeline handler
/// into a registry, auto-load every tenant found on disk and serve HTTP until
/// Ctrl-C.
pub async fn start_gateway(config: SwitchboardConfig, data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let sessions_root = config.sessions_root(data_dir);
    std::fs::create_dir_all(&sessions_root)?;

    let db_url = config.database_url(data_dir);
    let db_pool = sqlx::SqlitePool::connect(&db_url).await?;
    crate::run_migrations(&db_pool).await?;
    let store = Arc::new(SqliteTenantConfigStore::new(db_pool.clone()));

    let factory = Arc::new(WhatsAppConnectionFactory::new(SidecarSettings {
        url: config.sidecar.url.clone(),
        connect_retries: config.sidecar.connect_retries,
        send_timeout: Duration::from_secs(config.sidecar.send_timeout_secs),
    }));
    let handler = Arc::new(WebhookTurnHandler::new(
        config.pipeline.url.clone(),
        Duration::from_secs(config.pipeline.timeout_secs),
    )?);
    if handler.url().is_none() {
        warn!("no pipeline url configured, turns will be dropped");
    }

    let registry = Arc::new(
        SessionRegistry::new(
            factory,
            store,
            handler,
            RegistryOptions::new(&sessions_root)
                .with_default_debounce_ms(config.sessions.default_debounce_ms),
        )
        .with_gate(InboundGate {
            ignored_contacts: config.gating.ignored_contacts.clone(),
            ignore_groups: config.gating.ignore_groups,
        }),
    );

    let scan = CredentialsDirectory::new(&sessions_root)
        .with_reserved(config.sessions.reserved_dirs.iter());
    let report = registry.auto_load_all(&scan).await?;
    info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "auto-loaded tenants"
    );

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        Arc::clone(&registry),
        Duration::from_secs(config.sessions.sweep_interval_secs),
        Duration::from_secs(config.sessions.idle_reclaim_secs),
        shutdown.clone(),
    );

    let app = build_gateway_app(AppState {
        registry: Arc::clone(&registry),
    });
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, sessions_root = %sessions_root.display(), "gateway listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
            _ = serve_shutdown.cancelled() => {},
        }
    })
    .await?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper
        && let Err(e) = sweeper.await
    {
        warn!(error = %e, "sweeper task failed");
    }
    registry.shutdown().await;
    db_pool.close().await;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.tenant_ids().len(),
    }))
}

async fn list_sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<_> = state
        .registry
        .tenant_ids()
        .iter()
        .filter_map(|id| state.registry.status(id))
        .collect();
    Json(json!({ "sessions": sessions }))
}

async fn create_session_handler(
    State(state): State<AppState>,
    UrlPath(phone): UrlPath<String>,
) -> Response {
    match state.registry.create_for_contact(&phone).await {
        Ok(tenant_id) => {
            info!(tenant_id = %tenant_id, "session created");
            (
                StatusCode::CREATED,
                Json(json!({ "tenant_id": tenant_id, "status": "created" })),
            )
                .into_response()
        },
        Err(e) => session_error_response(&TenantId::from_contact(&phone), "create", e),
    }
}

async fn pause_session_handler(
    State(state): State<AppState>,
    UrlPath(phone): UrlPath<String>,
) -> Response {
    let tenant_id = TenantId::from_contact(&phone);
    if !state.registry.contains(&tenant_id) {
        return not_found();
    }
    match state.registry.pause(&tenant_id).await {
        Ok(changed) => Json(json!({
            "tenant_id": tenant_id,
            "paused": true,
            "changed": changed,
        }))
        .into_response(),
        Err(e) => session_error_response(&tenant_id, "pause", e),
    }
}

async fn resume_session_handler(
    State(state): State<AppState>,
    UrlPath(phone): UrlPath<String>,
) -> Response {
    let tenant_id = TenantId::from_contact(&phone);
    if !state.registry.contains(&tenant_id) {
        return not_found();
    }
    match state.registry.resume(&tenant_id).await {
        Ok(changed) => Json(json!({
            "tenant_id": tenant_id,
            "paused": false,
            "changed": changed,
        }))
        .into_response(),
        Err(e) => session_error_response(&tenant_id, "resume", e),
    }
}

async fn session_status_handler(
    State(state): State<AppState>,
    UrlPath(phone): UrlPath<String>,
) -> Response {
    match state.registry.status(&TenantId::from_contact(&phone)) {
        Some(status) => Json(status).into_response(),
        None => not_found(),
    }
}

async fn qr_handler(State(state): State<AppState>, UrlPath(phone): UrlPath<String>) -> Response {
    let Some(session) = state.registry.get(&TenantId::from_contact(&phone)) else {
        return (StatusCode::NOT_FOUND, SESSION_NOT_FOUND).into_response();
    };
    if session.is_ready() {
        return NO_QR_NEEDED.into_response();
    }
    match session.pairing_artifact() {
        Some(artifact) => artifact.into_response(),
        None => QR_NOT_READY.into_response(),
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": SESSION_NOT_FOUND })),
    )
        .into_response()
}

fn session_error_response(tenant_id: &TenantId, op: &str, e: SessionError) -> Response {
    error!(tenant_id = %tenant_id, op, error = %e, "session operation failed");
    let status = match e {
        SessionError::Connection { .. } => StatusCode::BAD_GATEWAY,
        SessionError::InvalidTenantId { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
