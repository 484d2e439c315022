use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    serde::Serialize,
    switchboard_channels::{
        ConnectionEvent, ConnectionFactory, EventReceiver, GateDecision, InboundGate,
    },
    switchboard_common::types::InboundMessage,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, info, info_span, warn},
};

use crate::{
    aggregator::{SenderAggregator, join_worker},
    error::{Error, Result},
    tenant::TenantId,
    turn::{OutgoingObserver, SessionContext, TurnHandler},
};

/// What `GetSessionStatus` reports for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub tenant_id: TenantId,
    pub ready: bool,
    pub paused: bool,
    /// Latest pairing artifact (QR payload) while the connection awaits pairing.
    pub pending_pairing_artifact: Option<String>,
    /// Number of senders with a live aggregator.
    pub senders: usize,
}

/// Collaborators every session of a registry shares.
#[derive(Clone)]
pub(crate) struct SessionWiring {
    pub handler: Arc<dyn TurnHandler>,
    pub observer: Option<Arc<dyn OutgoingObserver>>,
    pub gate: InboundGate,
}

/// One tenant's connection plus its per-sender aggregators.
///
/// Owned by the registry; lifecycle transitions go through it so that they
/// are serialized per tenant.
pub struct SessionHandle {
    shared: Arc<Shared>,
    credentials_path: PathBuf,
    closed: CancellationToken,
}

struct Shared {
    context: Arc<SessionContext>,
    handler: Arc<dyn TurnHandler>,
    observer: Option<Arc<dyn OutgoingObserver>>,
    gate: InboundGate,
    state: Mutex<SessionState>,
}

struct SessionState {
    ready: bool,
    paused: bool,
    pairing_artifact: Option<String>,
    debounce: Duration,
    aggregators: HashMap<String, SenderAggregator>,
}

impl SessionHandle {
    /// Build the connection and start routing its events. The connection is
    /// not initialized yet.
    pub(crate) fn spawn(
        tenant_id: TenantId,
        credentials_path: PathBuf,
        factory: &dyn ConnectionFactory,
        wiring: SessionWiring,
        debounce: Duration,
        paused: bool,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = factory.create(tenant_id.as_str(), events_tx);
        let span = info_span!("session", tenant_id = %tenant_id);
        let context = Arc::new(SessionContext {
            tenant_id,
            connection,
        });
        let shared = Arc::new(Shared {
            context,
            handler: wiring.handler,
            observer: wiring.observer,
            gate: wiring.gate,
            state: Mutex::new(SessionState {
                ready: false,
                paused,
                pairing_artifact: None,
                debounce,
                aggregators: HashMap::new(),
            }),
        });

        let closed = CancellationToken::new();
        tokio::spawn(route_events(Arc::clone(&shared), events_rx, closed.clone()).instrument(span));

        Arc::new(Self {
            shared,
            credentials_path,
            closed,
        })
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.shared.context.tenant_id
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.shared.context
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().ready
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn pairing_artifact(&self) -> Option<String> {
        self.shared.lock().pairing_artifact.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.shared.lock();
        SessionStatus {
            tenant_id: self.tenant_id().clone(),
            ready: state.ready,
            paused: state.paused,
            pending_pairing_artifact: state.pairing_artifact.clone(),
            senders: state.aggregators.len(),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.shared.lock().debounce
    }

    pub fn sender_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.lock().aggregators.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) async fn initialize(&self) -> Result<()> {
        self.shared
            .context
            .connection
            .initialize(&self.credentials_path)
            .await
            .map_err(|e| Error::connection(self.tenant_id(), e))
    }

    pub(crate) async fn destroy_connection(&self) -> Result<()> {
        self.shared
            .context
            .connection
            .destroy()
            .await
            .map_err(|e| Error::connection(self.tenant_id(), e))?;
        let mut state = self.shared.lock();
        state.ready = false;
        state.pairing_artifact = None;
        Ok(())
    }

    /// Mark the session paused and stop every aggregator. Entries stay in
    /// the map so the senders are known on resume.
    pub(crate) async fn suspend(&self) {
        let stopping: Vec<_> = {
            let mut state = self.shared.lock();
            state.paused = true;
            state
                .aggregators
                .values_mut()
                .filter_map(|agg| agg.cancel().map(|task| (agg.sender_id().to_string(), task)))
                .collect()
        };
        for (sender_id, task) in stopping {
            join_worker(&sender_id, task).await;
        }
    }

    /// Clear the paused flag and start every known sender from `Idle`.
    pub(crate) fn reactivate(&self, debounce: Duration) {
        let mut state = self.shared.lock();
        state.debounce = debounce;
        for (sender_id, agg) in state.aggregators.iter_mut() {
            *agg = SenderAggregator::spawn(
                sender_id.clone(),
                debounce,
                Arc::clone(&self.shared.context),
                Arc::clone(&self.shared.handler),
            );
        }
        state.paused = false;
    }

    /// Drop aggregators that are idle, drained and quiet for `idle_for`.
    /// Returns how many were removed.
    pub fn reclaim_idle(&self, idle_for: Duration) -> usize {
        let mut state = self.shared.lock();
        let before = state.aggregators.len();
        state
            .aggregators
            .retain(|_, agg| !agg.is_reclaimable(idle_for));
        let reclaimed = before - state.aggregators.len();
        if reclaimed > 0 {
            debug!(tenant_id = %self.tenant_id(), reclaimed, "reclaimed idle sender aggregators");
        }
        reclaimed
    }

    /// Stop routing events and stop every aggregator. The connection is left
    /// to the caller.
    pub(crate) async fn close(&self) {
        self.closed.cancel();
        self.suspend().await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("tenant_id", self.tenant_id())
            .field("credentials_path", &self.credentials_path)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::PairingPrompt(artifact) => {
                self.lock().pairing_artifact = Some(artifact);
                info!("pairing required, artifact available");
            },
            ConnectionEvent::Ready => {
                let mut state = self.lock();
                state.ready = true;
                state.pairing_artifact = None;
                info!("connection ready");
            },
            ConnectionEvent::Disconnected { reason } => {
                self.lock().ready = false;
                warn!(reason = %reason, "connection lost");
            },
            ConnectionEvent::Message(message) => self.route_message(message),
            ConnectionEvent::OutgoingObserved(message) => self.observe_outgoing(message),
        }
    }

    fn route_message(&self, message: InboundMessage) {
        let sender_id = match self.gate.check(&message) {
            GateDecision::Accept(sender_id) => sender_id,
            GateDecision::Reject(reason) => {
                debug!(?reason, "inbound message filtered");
                return;
            },
        };

        let mut state = self.lock();
        if state.paused {
            debug!("session paused, dropping inbound message");
            return;
        }
        let debounce = state.debounce;
        let aggregator = state
            .aggregators
            .entry(sender_id.clone())
            .or_insert_with(|| {
                debug!(sender_id = %sender_id, "first message from sender");
                SenderAggregator::spawn(
                    sender_id.clone(),
                    debounce,
                    Arc::clone(&self.context),
                    Arc::clone(&self.handler),
                )
            });
        if aggregator.accept(message).is_err() {
            warn!(sender_id = %sender_id, "sender aggregator stopped, dropping message");
        }
    }

    fn observe_outgoing(&self, message: InboundMessage) {
        let Some(observer) = self.observer.as_ref().map(Arc::clone) else {
            return;
        };
        let tenant_id = self.context.tenant_id.clone();
        tokio::spawn(
            async move { observer.observe(&tenant_id, message).await }.in_current_span(),
        );
    }
}

async fn route_events(shared: Arc<Shared>, mut events: EventReceiver, closed: CancellationToken) {
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => shared.handle_event(event),
                None => break,
            },
        }
    }
    debug!("session event routing stopped");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::*,
        switchboard_channels::{ConnectionHandle, EventSender},
        tokio::time::sleep,
    };

    /// Factory that keeps the event sender so the test can play the network.
    #[derive(Default)]
    struct CapturingFactory {
        events: Mutex<Option<EventSender>>,
    }

    impl CapturingFactory {
        fn emit(&self, event: ConnectionEvent) {
            self.events
                .lock()
                .unwrap()
                .as_ref()
                .unwrap()
                .send(event)
                .unwrap();
        }
    }

    impl ConnectionFactory for CapturingFactory {
        fn create(&self, _tenant_id: &str, events: EventSender) -> Arc<dyn ConnectionHandle> {
            *self.events.lock().unwrap() = Some(events);
            Arc::new(NullConnection)
        }
    }

    fn session(
        factory: &CapturingFactory,
        handler: Arc<RecordingHandler>,
        paused: bool,
    ) -> Arc<SessionHandle> {
        SessionHandle::spawn(
            TenantId::from_contact("5219831844892"),
            PathBuf::from("/tmp/unused"),
            factory,
            SessionWiring {
                handler,
                observer: None,
                gate: InboundGate::default(),
            },
            Duration::from_millis(300),
            paused,
        )
    }

    fn from(sender: &str, body: &str) -> ConnectionEvent {
        ConnectionEvent::Message(InboundMessage::text(sender, body))
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_artifact_cleared_on_ready() {
        let factory = CapturingFactory::default();
        let session = session(&factory, RecordingHandler::new(), false);

        factory.emit(ConnectionEvent::PairingPrompt("2@abc".into()));
        sleep(Duration::from_millis(1)).await;
        assert_eq!(session.pairing_artifact().as_deref(), Some("2@abc"));
        assert!(!session.is_ready());

        factory.emit(ConnectionEvent::Ready);
        sleep(Duration::from_millis(1)).await;
        let status = session.status();
        assert!(status.ready);
        assert_eq!(status.pending_pairing_artifact, None);

        factory.emit(ConnectionEvent::Disconnected {
            reason: "navigation".into(),
        });
        sleep(Duration::from_millis(1)).await;
        assert!(!session.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn routes_by_normalized_sender() {
        let factory = CapturingFactory::default();
        let handler = RecordingHandler::new();
        let session = session(&factory, Arc::clone(&handler), false);

        factory.emit(from("5219831844892@c.us", "a"));
        factory.emit(from("9831844892@c.us", "b"));
        factory.emit(from("5215550001111@c.us", "c"));
        factory.emit(from("status@broadcast", "story"));
        factory.emit(from("120363@g.us", "group"));
        sleep(Duration::from_secs(1)).await;

        assert_eq!(session.sender_ids(), vec!["5550001111", "9831844892"]);
        let mut turns = handler.turns();
        turns.sort_by(|a, b| a.sender_id.cmp(&b.sender_id));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].bodies, vec!["c"]);
        assert_eq!(turns[1].bodies, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_drops_inbound() {
        let factory = CapturingFactory::default();
        let handler = RecordingHandler::new();
        let session = session(&factory, Arc::clone(&handler), true);

        factory.emit(from("5219831844892@c.us", "hello?"));
        sleep(Duration::from_secs(1)).await;
        assert!(handler.bodies().is_empty());
        assert_eq!(session.status().senders, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_keeps_senders_and_reactivate_restarts_idle() {
        let factory = CapturingFactory::default();
        let handler = RecordingHandler::new();
        let session = session(&factory, Arc::clone(&handler), false);

        factory.emit(from("5219831844892@c.us", "buffered"));
        sleep(Duration::from_millis(100)).await;
        session.suspend().await;
        sleep(Duration::from_secs(1)).await;
        assert!(handler.bodies().is_empty());
        assert_eq!(session.status().senders, 1);
        assert!(session.is_paused());

        session.reactivate(Duration::from_millis(300));
        assert!(!session.is_paused());
        factory.emit(from("5219831844892@c.us", "after resume"));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(handler.bodies(), vec![vec!["after resume"]]);
    }

    #[tokio::test(start_paused = true)]
    async fn reclaim_removes_only_quiet_senders() {
        let factory = CapturingFactory::default();
        let handler = RecordingHandler::new();
        let session = session(&factory, Arc::clone(&handler), false);

        factory.emit(from("5211111111111@c.us", "old"));
        sleep(Duration::from_secs(120)).await;
        factory.emit(from("5212222222222@c.us", "new"));
        sleep(Duration::from_millis(10)).await;

        assert_eq!(session.reclaim_idle(Duration::from_secs(60)), 1);
        assert_eq!(session.sender_ids(), vec!["2222222222"]);
    }
}
