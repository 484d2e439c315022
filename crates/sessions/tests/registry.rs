//! Registry lifecycle driven through fake connections and a recording turn
//! handler.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    switchboard_channels::{ConnectionEvent, ConnectionFactory, ConnectionHandle, EventSender},
    switchboard_common::types::{InboundMessage, OutboundPayload},
    switchboard_sessions::{
        Error, InMemoryTenantConfigProvider, OutgoingObserver, RegistryOptions, SessionContext,
        SessionRegistry, TenantConfig, TenantConfigPatch, TenantConfigProvider, TenantId,
        TurnError, TurnHandler,
    },
    tokio::time::sleep,
};

const DEBOUNCE_MS: u64 = 300;

// ── Fakes ───────────────────────────────────────────────────────────────────

struct FakeConnection {
    events: EventSender,
    fail_init: AtomicBool,
    fail_destroy: AtomicBool,
    destroy_delay: Duration,
    initialized: AtomicUsize,
    destroyed: AtomicUsize,
    sent: Mutex<Vec<(String, OutboundPayload)>>,
}

#[async_trait]
impl ConnectionHandle for FakeConnection {
    async fn initialize(&self, _credentials_path: &Path) -> switchboard_channels::Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(switchboard_channels::Error::failed("browser did not start"));
        }
        self.initialized.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::Ready);
        Ok(())
    }

    async fn destroy(&self) -> switchboard_channels::Result<()> {
        if !self.destroy_delay.is_zero() {
            sleep(self.destroy_delay).await;
        }
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(switchboard_channels::Error::failed("logout rejected"));
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(
        &self,
        recipient: &str,
        payload: &OutboundPayload,
    ) -> switchboard_channels::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeFactory {
    failing_init: HashSet<String>,
    destroy_delay: Duration,
    created: AtomicUsize,
    connections: Mutex<HashMap<String, Arc<FakeConnection>>>,
}

impl FakeFactory {
    fn connection(&self, tenant_id: &TenantId) -> Arc<FakeConnection> {
        Arc::clone(&self.connections.lock().unwrap()[tenant_id.as_str()])
    }

    fn emit(&self, tenant_id: &TenantId, event: ConnectionEvent) {
        self.connection(tenant_id).events.send(event).unwrap();
    }

    fn message(&self, tenant_id: &TenantId, sender: &str, body: &str) {
        self.emit(
            tenant_id,
            ConnectionEvent::Message(InboundMessage::text(sender, body)),
        );
    }
}

impl ConnectionFactory for FakeFactory {
    fn create(&self, tenant_id: &str, events: EventSender) -> Arc<dyn ConnectionHandle> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(FakeConnection {
            events,
            fail_init: AtomicBool::new(self.failing_init.contains(tenant_id)),
            fail_destroy: AtomicBool::new(false),
            destroy_delay: self.destroy_delay,
            initialized: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });
        self.connections
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), Arc::clone(&conn));
        conn
    }
}

#[derive(Debug, Clone)]
struct Turn {
    tenant_id: String,
    sender_id: String,
    bodies: Vec<String>,
}

/// Replies "got N" to the chat of the last message in each batch.
#[derive(Default)]
struct ReplyingHandler {
    delay: Duration,
    turns: Mutex<Vec<Turn>>,
    active: Mutex<HashMap<(String, String), usize>>,
    overlap: AtomicBool,
}

impl ReplyingHandler {
    fn bodies_for(&self, sender_id: &str) -> Vec<Vec<String>> {
        self.turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.sender_id == sender_id)
            .map(|t| t.bodies.clone())
            .collect()
    }

    fn turn_count(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl TurnHandler for ReplyingHandler {
    async fn handle_turn(
        &self,
        session: &SessionContext,
        sender_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), TurnError> {
        let key = (session.tenant_id.to_string(), sender_id.to_string());
        {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(key.clone()).or_default();
            *count += 1;
            if *count > 1 {
                self.overlap.store(true, Ordering::SeqCst);
            }
        }
        let chat_id = batch.last().map(|m| m.chat_id.clone()).unwrap_or_default();
        self.turns.lock().unwrap().push(Turn {
            tenant_id: key.0.clone(),
            sender_id: sender_id.to_string(),
            bodies: batch.iter().map(|m| m.body.clone()).collect(),
        });

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let result = session
            .connection
            .send(
                &chat_id,
                &OutboundPayload::text(format!("got {}", batch.len())),
            )
            .await;

        if let Some(count) = self.active.lock().unwrap().get_mut(&key) {
            *count -= 1;
        }
        result.map_err(TurnError::from)
    }
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<(TenantId, String)>>,
}

#[async_trait]
impl OutgoingObserver for RecordingObserver {
    async fn observe(&self, tenant_id: &TenantId, message: InboundMessage) {
        self.seen
            .lock()
            .unwrap()
            .push((tenant_id.clone(), message.body));
    }
}

/// Wraps the in-memory provider so reads or writes can be made to fail.
#[derive(Default)]
struct FlakyProvider {
    inner: Arc<InMemoryTenantConfigProvider>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
}

#[async_trait]
impl TenantConfigProvider for FlakyProvider {
    async fn get_tenant_config(
        &self,
        tenant_id: &TenantId,
    ) -> switchboard_sessions::Result<TenantConfig> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::config(tenant_id, "database is locked"));
        }
        self.inner.get_tenant_config(tenant_id).await
    }

    async fn set_tenant_config(
        &self,
        tenant_id: &TenantId,
        patch: TenantConfigPatch,
    ) -> switchboard_sessions::Result<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(Error::config(tenant_id, "database is locked"));
        }
        self.inner.set_tenant_config(tenant_id, patch).await
    }

    async fn ensure_tenant(
        &self,
        tenant_id: &TenantId,
        defaults: TenantConfig,
    ) -> switchboard_sessions::Result<()> {
        self.inner.ensure_tenant(tenant_id, defaults).await
    }
}

struct Harness {
    _root: tempfile::TempDir,
    factory: Arc<FakeFactory>,
    store: Arc<FlakyProvider>,
    provider: Arc<InMemoryTenantConfigProvider>,
    handler: Arc<ReplyingHandler>,
    registry: SessionRegistry,
}

fn harness(factory: FakeFactory, handler: ReplyingHandler) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let factory = Arc::new(factory);
    let store = Arc::new(FlakyProvider::default());
    let provider = Arc::clone(&store.inner);
    let handler = Arc::new(handler);
    let registry = SessionRegistry::new(
        Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
        Arc::clone(&store) as Arc<dyn TenantConfigProvider>,
        Arc::clone(&handler) as Arc<dyn TurnHandler>,
        RegistryOptions::new(root.path()).with_default_debounce_ms(DEBOUNCE_MS),
    );
    Harness {
        _root: root,
        factory,
        store,
        provider,
        handler,
        registry,
    }
}

fn tenant(n: u8) -> TenantId {
    TenantId::from_contact(&format!("52198318448{n:02}"))
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn create_onboards_and_answers_bursts() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = h.registry.create_for_contact("5219831844892").await.unwrap();

    assert_eq!(id, TenantId::from_contact("5219831844892"));
    assert!(h.registry.credentials_path(&id).is_dir());
    assert_eq!(
        h.provider.snapshot(&id).await.unwrap().debounce_ms,
        DEBOUNCE_MS
    );

    h.factory.message(&id, "5215550001111@c.us", "hi");
    sleep(Duration::from_millis(50)).await;
    h.factory.message(&id, "5215550001111@c.us", "how are you");
    sleep(Duration::from_secs(1)).await;

    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec![
        "hi",
        "how are you"
    ]]);
    let sent = h.factory.connection(&id).sent.lock().unwrap().clone();
    assert_eq!(sent, vec![(
        "5215550001111@c.us".to_string(),
        OutboundPayload::text("got 2")
    )]);

    let status = h.registry.status(&id).unwrap();
    assert!(status.ready);
    assert!(!status.paused);
    assert_eq!(status.senders, 1);
}

#[tokio::test(start_paused = true)]
async fn create_twice_is_one_session() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(1);

    let (a, b) = tokio::join!(h.registry.create(&id), h.registry.create(&id));
    a.unwrap();
    b.unwrap();
    h.registry.create(&id).await.unwrap();

    assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.factory.connection(&id).initialized.load(Ordering::SeqCst),
        1
    );
    assert_eq!(h.registry.tenant_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_are_idempotent() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(2);
    h.registry.create(&id).await.unwrap();
    sleep(Duration::from_millis(1)).await;

    assert!(h.registry.pause(&id).await.unwrap());
    assert!(!h.registry.pause(&id).await.unwrap());
    assert!(h.provider.snapshot(&id).await.unwrap().is_paused);
    let conn = h.factory.connection(&id);
    assert_eq!(conn.destroyed.load(Ordering::SeqCst), 1);
    let status = h.registry.status(&id).unwrap();
    assert!(status.paused);
    assert!(!status.ready);

    assert!(h.registry.resume(&id).await.unwrap());
    assert!(!h.registry.resume(&id).await.unwrap());
    assert!(!h.provider.snapshot(&id).await.unwrap().is_paused);
    // Same connection, re-initialized from cached credentials.
    assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(conn.initialized.load(Ordering::SeqCst), 2);
    sleep(Duration::from_millis(1)).await;
    assert!(h.registry.status(&id).unwrap().ready);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_calls_on_unknown_tenant_are_noops() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(3);

    assert!(!h.registry.pause(&id).await.unwrap());
    assert!(!h.registry.resume(&id).await.unwrap());
    assert!(h.registry.status(&id).is_none());
    assert!(h.registry.tenant_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pause_during_turn_drops_pending_and_resume_starts_idle() {
    let h = harness(
        FakeFactory::default(),
        ReplyingHandler {
            delay: Duration::from_secs(2),
            ..ReplyingHandler::default()
        },
    );
    let id = tenant(4);
    h.registry.create(&id).await.unwrap();

    h.factory.message(&id, "5215550001111@c.us", "first");
    sleep(Duration::from_millis(400)).await;
    assert_eq!(h.handler.turn_count(), 1);
    h.factory.message(&id, "5215550001111@c.us", "during turn");
    sleep(Duration::from_millis(10)).await;

    assert!(h.registry.pause(&id).await.unwrap());
    h.factory.message(&id, "5215550001111@c.us", "while paused");
    sleep(Duration::from_secs(5)).await;

    // Neither the deferred nor the paused message produced a turn.
    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec!["first"]]);
    assert_eq!(h.registry.status(&id).unwrap().senders, 1);

    assert!(h.registry.resume(&id).await.unwrap());
    h.factory.message(&id, "5215550001111@c.us", "back");
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.handler.bodies_for("5550001111"), vec![
        vec!["first"],
        vec!["back"]
    ]);
    assert!(!h.handler.overlap.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn failed_pause_leaves_session_running() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(5);
    h.registry.create(&id).await.unwrap();
    h.factory
        .connection(&id)
        .fail_destroy
        .store(true, Ordering::SeqCst);

    let err = h.registry.pause(&id).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert!(!h.registry.status(&id).unwrap().paused);
    assert!(!h.provider.snapshot(&id).await.unwrap().is_paused);

    h.factory.message(&id, "5215550001111@c.us", "still there?");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec!["still there?"]]);
}

#[tokio::test(start_paused = true)]
async fn unpersisted_pause_keeps_buffered_messages() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(7);
    h.registry.create(&id).await.unwrap();

    h.factory.message(&id, "5215550001111@c.us", "buffered");
    sleep(Duration::from_millis(50)).await;
    h.store.fail_set.store(true, Ordering::SeqCst);

    let err = h.registry.pause(&id).await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    sleep(Duration::from_secs(2)).await;

    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec!["buffered"]]);
    let conn = h.factory.connection(&id);
    assert_eq!(conn.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(conn.initialized.load(Ordering::SeqCst), 2);
    let status = h.registry.status(&id).unwrap();
    assert!(!status.paused);
    assert!(status.ready);
    assert!(!h.provider.snapshot(&id).await.unwrap().is_paused);
}

#[tokio::test(start_paused = true)]
async fn pause_can_be_retried_when_restore_also_fails() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(8);
    h.registry.create(&id).await.unwrap();
    let conn = h.factory.connection(&id);
    h.store.fail_set.store(true, Ordering::SeqCst);
    conn.fail_init.store(true, Ordering::SeqCst);

    assert!(h.registry.pause(&id).await.is_err());
    // In-memory and stored flags still agree.
    assert!(!h.registry.status(&id).unwrap().paused);
    assert!(!h.provider.snapshot(&id).await.unwrap().is_paused);

    h.store.fail_set.store(false, Ordering::SeqCst);
    conn.fail_init.store(false, Ordering::SeqCst);
    assert!(h.registry.pause(&id).await.unwrap());
    assert!(h.provider.snapshot(&id).await.unwrap().is_paused);
    assert!(h.registry.resume(&id).await.unwrap());
    assert!(!h.provider.snapshot(&id).await.unwrap().is_paused);

    h.factory.message(&id, "5215550001111@c.us", "back again");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec!["back again"]]);
}

#[tokio::test(start_paused = true)]
async fn unpersisted_resume_stays_paused() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(9);
    h.registry.create(&id).await.unwrap();
    assert!(h.registry.pause(&id).await.unwrap());
    h.store.fail_set.store(true, Ordering::SeqCst);

    let err = h.registry.resume(&id).await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    let conn = h.factory.connection(&id);
    assert_eq!(conn.initialized.load(Ordering::SeqCst), 2);
    assert_eq!(conn.destroyed.load(Ordering::SeqCst), 2);
    assert!(h.registry.status(&id).unwrap().paused);
    assert!(h.provider.snapshot(&id).await.unwrap().is_paused);

    h.factory.message(&id, "5215550001111@c.us", "while paused");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.handler.turn_count(), 0);

    h.store.fail_set.store(false, Ordering::SeqCst);
    assert!(h.registry.resume(&id).await.unwrap());
    h.factory.message(&id, "5215550001111@c.us", "resumed");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.handler.bodies_for("5550001111"), vec![vec!["resumed"]]);
}

#[tokio::test(start_paused = true)]
async fn load_of_present_tenant_skips_config_lookup() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(14);
    h.registry.create(&id).await.unwrap();
    h.store.fail_get.store(true, Ordering::SeqCst);

    h.registry.load(&id, false).await.unwrap();
    assert_eq!(h.factory.created.load(Ordering::SeqCst), 1);
    assert!(h.registry.load(&tenant(15), false).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_create_leaves_no_entry() {
    let id = tenant(6);
    let h = harness(
        FakeFactory {
            failing_init: HashSet::from([id.to_string()]),
            ..FakeFactory::default()
        },
        ReplyingHandler::default(),
    );

    let err = h.registry.create(&id).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert!(h.registry.status(&id).is_none());
    assert!(!h.registry.pause(&id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn auto_load_continues_past_failures() {
    let paused = tenant(10);
    let active = tenant(11);
    let unconfigured = tenant(12);
    let broken = tenant(13);
    let h = harness(
        FakeFactory {
            failing_init: HashSet::from([broken.to_string()]),
            ..FakeFactory::default()
        },
        ReplyingHandler::default(),
    );
    h.provider
        .insert(paused.clone(), TenantConfig {
            is_paused: true,
            ..TenantConfig::default()
        })
        .await;
    h.provider
        .insert(active.clone(), TenantConfig::with_debounce_ms(200))
        .await;
    h.provider
        .insert(broken.clone(), TenantConfig::default())
        .await;

    let source = vec![
        paused.clone(),
        active.clone(),
        unconfigured.clone(),
        broken.clone(),
    ];
    let report = h.registry.auto_load_all(&source).await.unwrap();

    assert_eq!(report.loaded, vec![paused.clone(), active.clone()]);
    assert_eq!(report.failed, vec![unconfigured, broken]);

    let mut expected = vec![paused.clone(), active.clone()];
    expected.sort();
    assert_eq!(h.registry.tenant_ids(), expected);
    assert!(h.registry.status(&paused).unwrap().paused);
    assert_eq!(
        h.factory
            .connection(&paused)
            .initialized
            .load(Ordering::SeqCst),
        0
    );
    assert_eq!(
        h.factory
            .connection(&active)
            .initialized
            .load(Ordering::SeqCst),
        1
    );

    // A tenant loaded paused comes up on resume.
    assert!(h.registry.resume(&paused).await.unwrap());
    assert_eq!(
        h.factory
            .connection(&paused)
            .initialized
            .load(Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn slow_pause_does_not_block_other_tenants() {
    let h = harness(
        FakeFactory {
            destroy_delay: Duration::from_secs(10),
            ..FakeFactory::default()
        },
        ReplyingHandler::default(),
    );
    let slow = tenant(20);
    let busy = tenant(21);
    h.registry.create(&slow).await.unwrap();
    h.registry.create(&busy).await.unwrap();

    let registry = Arc::new(h.registry);
    let pausing = {
        let registry = Arc::clone(&registry);
        let slow = slow.clone();
        tokio::spawn(async move { registry.pause(&slow).await })
    };
    sleep(Duration::from_millis(10)).await;

    h.factory.message(&busy, "5215550002222@c.us", "anyone?");
    sleep(Duration::from_secs(1)).await;
    assert!(!pausing.is_finished());
    assert_eq!(h.handler.bodies_for("5550002222"), vec![vec!["anyone?"]]);
    assert!(registry.status(&busy).unwrap().ready);

    assert!(pausing.await.unwrap().unwrap());
    assert!(registry.status(&slow).unwrap().paused);
}

#[tokio::test(start_paused = true)]
async fn senders_are_independent_across_tenants() {
    let h = harness(
        FakeFactory::default(),
        ReplyingHandler {
            delay: Duration::from_secs(1),
            ..ReplyingHandler::default()
        },
    );
    let a = tenant(30);
    let b = tenant(31);
    h.registry.create(&a).await.unwrap();
    h.registry.create(&b).await.unwrap();

    // Same sender writing to two tenants gets a turn at each.
    h.factory.message(&a, "5215550003333@c.us", "to a");
    h.factory.message(&b, "5215550003333@c.us", "to b");
    sleep(Duration::from_secs(3)).await;

    let turns = h.handler.turns.lock().unwrap().clone();
    assert_eq!(turns.len(), 2);
    let mut tenants: Vec<String> = turns.iter().map(|t| t.tenant_id.clone()).collect();
    tenants.sort();
    let mut expected = vec![a.to_string(), b.to_string()];
    expected.sort();
    assert_eq!(tenants, expected);
    assert!(!h.handler.overlap.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn pairing_artifact_visible_in_status() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let id = tenant(40);
    h.registry.create(&id).await.unwrap();

    h.factory.emit(&id, ConnectionEvent::Disconnected {
        reason: "logged out".into(),
    });
    h.factory
        .emit(&id, ConnectionEvent::PairingPrompt("2@qr-payload".into()));
    sleep(Duration::from_millis(1)).await;

    let status = h.registry.status(&id).unwrap();
    assert!(!status.ready);
    assert_eq!(
        status.pending_pairing_artifact.as_deref(),
        Some("2@qr-payload")
    );

    h.factory.emit(&id, ConnectionEvent::Ready);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.registry.status(&id).unwrap().pending_pairing_artifact, None);
}

#[tokio::test(start_paused = true)]
async fn outgoing_messages_reach_observer() {
    let root = tempfile::tempdir().unwrap();
    let factory = Arc::new(FakeFactory::default());
    let provider = Arc::new(InMemoryTenantConfigProvider::new());
    let observer = Arc::new(RecordingObserver::default());
    let registry = SessionRegistry::new(
        Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
        provider,
        Arc::new(ReplyingHandler::default()),
        RegistryOptions::new(root.path()),
    )
    .with_observer(Arc::clone(&observer) as Arc<dyn OutgoingObserver>);

    let id = tenant(50);
    registry.create(&id).await.unwrap();
    let mut own = InboundMessage::text("5219831844850@c.us", "bot off");
    own.from_me = true;
    factory.emit(&id, ConnectionEvent::OutgoingObserved(own));
    sleep(Duration::from_millis(10)).await;

    assert_eq!(observer.seen.lock().unwrap().clone(), vec![(
        id,
        "bot off".to_string()
    )]);
}

#[tokio::test(start_paused = true)]
async fn reclaim_and_shutdown() {
    let h = harness(FakeFactory::default(), ReplyingHandler::default());
    let a = tenant(60);
    let b = tenant(61);
    h.registry.create(&a).await.unwrap();
    h.registry.create(&b).await.unwrap();
    assert!(h.registry.pause(&b).await.unwrap());

    h.factory.message(&a, "5215550004444@c.us", "hello");
    sleep(Duration::from_secs(120)).await;
    assert_eq!(h.registry.reclaim_idle(Duration::from_secs(60)), 1);
    assert_eq!(h.registry.status(&a).unwrap().senders, 0);

    h.registry.shutdown().await;
    assert!(h.registry.tenant_ids().is_empty());
    assert_eq!(h.factory.connection(&a).destroyed.load(Ordering::SeqCst), 1);
    // Already destroyed by the pause.
    assert_eq!(h.factory.connection(&b).destroyed.load(Ordering::SeqCst), 1);
}
