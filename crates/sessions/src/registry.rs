//! The registry of live and paused tenant sessions.
//!
//! The registry is the only writer of the tenant → session map. Lifecycle
//! calls for one tenant are serialized by that tenant's lifecycle lock, held
//! across connection initialize/destroy; calls for different tenants only
//! share the short structural lock on the map itself.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use {
    futures::future::join_all,
    serde::Serialize,
    switchboard_channels::{ConnectionFactory, InboundGate},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::Result,
    provider::{DEFAULT_DEBOUNCE_MS, TenantConfig, TenantConfigPatch, TenantConfigProvider},
    scan::TenantSource,
    session::{SessionHandle, SessionStatus, SessionWiring},
    tenant::TenantId,
    turn::{OutgoingObserver, TurnHandler},
};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Parent of the per-tenant credentials directories.
    pub sessions_root: PathBuf,
    /// Debounce written into the configuration of newly created tenants.
    pub default_debounce_ms: u64,
}

impl RegistryOptions {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            default_debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    pub fn with_default_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.default_debounce_ms = debounce_ms;
        self
    }
}

/// Outcome of [`SessionRegistry::auto_load_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoLoadReport {
    pub loaded: Vec<TenantId>,
    pub failed: Vec<TenantId>,
}

#[derive(Default)]
struct TenantSlot {
    lifecycle: tokio::sync::Mutex<()>,
    session: RwLock<Option<Arc<SessionHandle>>>,
}

impl TenantSlot {
    fn current(&self) -> Option<Arc<SessionHandle>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set(&self, session: Option<Arc<SessionHandle>>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    fn take(&self) -> Option<Arc<SessionHandle>> {
        self.session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

pub struct SessionRegistry {
    factory: Arc<dyn ConnectionFactory>,
    provider: Arc<dyn TenantConfigProvider>,
    wiring: SessionWiring,
    options: RegistryOptions,
    slots: Mutex<HashMap<TenantId, Arc<TenantSlot>>>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        provider: Arc<dyn TenantConfigProvider>,
        handler: Arc<dyn TurnHandler>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            factory,
            provider,
            wiring: SessionWiring {
                handler,
                observer: None,
                gate: InboundGate::default(),
            },
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn OutgoingObserver>) -> Self {
        self.wiring.observer = Some(observer);
        self
    }

    pub fn with_gate(mut self, gate: InboundGate) -> Self {
        self.wiring.gate = gate;
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn provider(&self) -> &Arc<dyn TenantConfigProvider> {
        &self.provider
    }

    pub fn credentials_path(&self, tenant_id: &TenantId) -> PathBuf {
        self.options.sessions_root.join(tenant_id.as_str())
    }

    fn slot(&self, tenant_id: &TenantId) -> Arc<TenantSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(tenant_id.clone()).or_default())
    }

    fn existing_slot(&self, tenant_id: &TenantId) -> Option<Arc<TenantSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(tenant_id)
            .map(Arc::clone)
    }

    fn all_slots(&self) -> Vec<(TenantId, Arc<TenantSlot>)> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.all_slots()
            .into_iter()
            .filter_map(|(_, slot)| slot.current())
            .collect()
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<Arc<SessionHandle>> {
        self.existing_slot(tenant_id)?.current()
    }

    pub fn contains(&self, tenant_id: &TenantId) -> bool {
        self.get(tenant_id).is_some()
    }

    /// Tenants with a live or paused session, sorted.
    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self
            .sessions()
            .iter()
            .map(|s| s.tenant_id().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn status(&self, tenant_id: &TenantId) -> Option<SessionStatus> {
        self.get(tenant_id).map(|s| s.status())
    }

    /// Register a tenant's session and, unless `start_paused`, initialize its
    /// connection. Loading a tenant that is already present is a no-op.
    pub async fn load(&self, tenant_id: &TenantId, start_paused: bool) -> Result<()> {
        if self.contains(tenant_id) {
            info!(tenant_id = %tenant_id, "session already loaded");
            return Ok(());
        }
        let config = self.provider.get_tenant_config(tenant_id).await?;
        self.load_with_config(tenant_id, start_paused, &config)
            .await
    }

    async fn load_with_config(
        &self,
        tenant_id: &TenantId,
        start_paused: bool,
        config: &TenantConfig,
    ) -> Result<()> {
        let slot = self.slot(tenant_id);
        let _lifecycle = slot.lifecycle.lock().await;
        if slot.current().is_some() {
            info!(tenant_id = %tenant_id, "session already loaded");
            return Ok(());
        }

        let session = SessionHandle::spawn(
            tenant_id.clone(),
            self.credentials_path(tenant_id),
            self.factory.as_ref(),
            self.wiring.clone(),
            config.debounce(),
            start_paused,
        );
        // Visible before initialize so a pairing artifact can be fetched
        // while the connection waits to be paired.
        slot.set(Some(Arc::clone(&session)));

        if start_paused {
            info!(tenant_id = %tenant_id, "session loaded paused");
            return Ok(());
        }

        if let Err(e) = session.initialize().await {
            slot.set(None);
            session.close().await;
            return Err(e);
        }
        info!(tenant_id = %tenant_id, debounce_ms = config.debounce_ms, "session loaded");
        Ok(())
    }

    /// Load every persisted tenant, honoring each tenant's paused flag.
    ///
    /// One tenant failing does not stop the others; only failing to
    /// enumerate tenants is an error.
    pub async fn auto_load_all(&self, source: &dyn TenantSource) -> Result<AutoLoadReport> {
        let tenant_ids = source.tenant_ids().await?;
        debug!(count = tenant_ids.len(), "auto-loading sessions");

        let results = join_all(tenant_ids.into_iter().map(|tenant_id| async move {
            let result = self.auto_load_one(&tenant_id).await;
            (tenant_id, result)
        }))
        .await;

        let mut report = AutoLoadReport::default();
        for (tenant_id, result) in results {
            match result {
                Ok(()) => report.loaded.push(tenant_id),
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "failed to auto-load session");
                    report.failed.push(tenant_id);
                },
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "auto-load finished"
        );
        Ok(report)
    }

    async fn auto_load_one(&self, tenant_id: &TenantId) -> Result<()> {
        let config = self.provider.get_tenant_config(tenant_id).await?;
        self.load_with_config(tenant_id, config.is_paused, &config)
            .await
    }

    /// Onboard a tenant: make sure its credentials directory and
    /// configuration exist, then load it unpaused. An existing session is
    /// left as is.
    pub async fn create(&self, tenant_id: &TenantId) -> Result<()> {
        tokio::fs::create_dir_all(self.credentials_path(tenant_id)).await?;
        self.provider
            .ensure_tenant(
                tenant_id,
                TenantConfig::with_debounce_ms(self.options.default_debounce_ms),
            )
            .await?;
        self.load(tenant_id, false).await
    }

    /// [`create`](Self::create) for a raw contact identifier.
    pub async fn create_for_contact(&self, contact: &str) -> Result<TenantId> {
        let tenant_id = TenantId::from_contact(contact);
        self.create(&tenant_id).await?;
        Ok(tenant_id)
    }

    /// Tear down a tenant's connection, persist the paused flag, then stop
    /// the tenant's aggregators.
    ///
    /// Returns `false` if the tenant is unknown or already paused. Until the
    /// flag is persisted the aggregators are left alone, so a failed pause
    /// keeps every buffered and deferred message.
    pub async fn pause(&self, tenant_id: &TenantId) -> Result<bool> {
        let Some(slot) = self.existing_slot(tenant_id) else {
            return Ok(false);
        };
        let _lifecycle = slot.lifecycle.lock().await;
        let Some(session) = slot.current() else {
            return Ok(false);
        };
        if session.is_paused() {
            debug!(tenant_id = %tenant_id, "session already paused");
            return Ok(false);
        }

        session.destroy_connection().await?;
        if let Err(e) = self
            .provider
            .set_tenant_config(tenant_id, TenantConfigPatch::paused(true))
            .await
        {
            // The session is still unpaused, so a later pause can retry even
            // if the connection does not come back here.
            if let Err(init_err) = session.initialize().await {
                error!(
                    tenant_id = %tenant_id,
                    error = %init_err,
                    "failed to restore connection after pause could not be persisted"
                );
            }
            return Err(e);
        }
        session.suspend().await;

        info!(tenant_id = %tenant_id, "session paused");
        Ok(true)
    }

    /// Re-initialize a paused tenant's connection from its cached
    /// credentials and persist the cleared flag.
    ///
    /// Returns `false` if the tenant is unknown or not paused.
    pub async fn resume(&self, tenant_id: &TenantId) -> Result<bool> {
        let Some(slot) = self.existing_slot(tenant_id) else {
            return Ok(false);
        };
        let _lifecycle = slot.lifecycle.lock().await;
        let Some(session) = slot.current() else {
            return Ok(false);
        };
        let config = self.provider.get_tenant_config(tenant_id).await?;
        if !config.is_paused || !session.is_paused() {
            debug!(
                tenant_id = %tenant_id,
                configured = config.is_paused,
                session = session.is_paused(),
                "session not paused"
            );
            return Ok(false);
        }

        session.initialize().await?;
        if let Err(e) = self
            .provider
            .set_tenant_config(tenant_id, TenantConfigPatch::paused(false))
            .await
        {
            if let Err(destroy_err) = session.destroy_connection().await {
                error!(
                    tenant_id = %tenant_id,
                    error = %destroy_err,
                    "failed to tear down connection after resume could not be persisted"
                );
            }
            return Err(e);
        }
        session.reactivate(config.debounce());

        info!(tenant_id = %tenant_id, "session resumed");
        Ok(true)
    }

    /// Drop idle sender aggregators across all sessions.
    pub fn reclaim_idle(&self, idle_for: Duration) -> usize {
        self.sessions()
            .iter()
            .map(|s| s.reclaim_idle(idle_for))
            .sum()
    }

    /// Stop every session: aggregators first, then connections.
    pub async fn shutdown(&self) {
        let slots = self.all_slots();
        let count = slots.len();
        join_all(slots.into_iter().map(|(tenant_id, slot)| async move {
            let _lifecycle = slot.lifecycle.lock().await;
            let Some(session) = slot.take() else {
                return;
            };
            let was_paused = session.is_paused();
            session.close().await;
            if !was_paused && let Err(e) = session.destroy_connection().await {
                warn!(tenant_id = %tenant_id, error = %e, "failed to destroy connection on shutdown");
            }
        }))
        .await;
        info!(sessions = count, "session registry shut down");
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("options", &self.options)
            .field("tenants", &self.tenant_ids())
            .finish_non_exhaustive()
    }
}
