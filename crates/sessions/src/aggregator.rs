//! Per-sender message aggregation.
//!
//! Each [`SenderAggregator`] owns a worker task that buffers a sender's
//! messages, waits for a quiet period (the debounce window) and then hands
//! the whole burst to the [`TurnHandler`] as one turn. While a turn is in
//! flight new messages are deferred; when it finishes they are replayed into
//! a fresh debounce window. A sender never has two turns running at once.
//! A panicking turn counts as a failed turn and frees the sender; this needs
//! the unwinding panic strategy, so no profile sets `panic = "abort"`.
//!
//! ```text
//!  Idle ──accept──▶ Buffering ──timer──▶ Processing ──done──▶ Idle
//!                     ▲   │accept                 │
//!                     └───┘ (timer re-armed)      └─deferred──▶ Buffering
//! ```

use std::{sync::Arc, time::Duration};

use {
    serde::Serialize,
    switchboard_common::types::InboundMessage,
    tokio::{
        sync::{mpsc, watch},
        task::{JoinError, JoinHandle},
        time::Instant,
    },
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, error, info_span, warn},
};

use crate::turn::{SessionContext, TurnError, TurnHandler};

type TurnTask = JoinHandle<Result<(), TurnError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatorPhase {
    /// Nothing buffered, no timer, no turn.
    Idle,
    /// Messages buffered and the debounce timer armed.
    Buffering,
    /// A turn is running; new messages are deferred.
    Processing,
}

/// Point-in-time view of an aggregator, published by its worker.
#[derive(Debug, Clone)]
pub struct AggregatorSnapshot {
    pub phase: AggregatorPhase,
    pub buffered: usize,
    pub deferred: usize,
    /// Messages the worker has taken off its inbox.
    pub received: u64,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub last_activity: Instant,
}

impl AggregatorSnapshot {
    fn idle(at: Instant) -> Self {
        Self {
            phase: AggregatorPhase::Idle,
            buffered: 0,
            deferred: 0,
            received: 0,
            turns_completed: 0,
            turns_failed: 0,
            last_activity: at,
        }
    }
}

/// Handle to one sender's aggregation worker.
///
/// Dropping the handle stops the worker.
pub struct SenderAggregator {
    sender_id: String,
    inbox: mpsc::UnboundedSender<InboundMessage>,
    snapshot: watch::Receiver<AggregatorSnapshot>,
    accepted: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SenderAggregator {
    /// Spawn a worker in the `Idle` state.
    pub fn spawn(
        sender_id: impl Into<String>,
        debounce: Duration,
        session: Arc<SessionContext>,
        handler: Arc<dyn TurnHandler>,
    ) -> Self {
        let sender_id = sender_id.into();
        let (inbox, rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let (snapshot_tx, snapshot) = watch::channel(AggregatorSnapshot::idle(now));
        let cancel = CancellationToken::new();

        let span = info_span!(
            "sender",
            tenant_id = %session.tenant_id,
            sender_id = %sender_id,
        );
        let worker = Worker {
            debounce,
            session,
            handler,
            sender_id: sender_id.clone(),
            buffer: Vec::new(),
            deferred: Vec::new(),
            deadline: None,
            in_flight: None,
            received: 0,
            turns_completed: 0,
            turns_failed: 0,
            last_activity: now,
            snapshot: snapshot_tx,
        };
        let task = tokio::spawn(worker.run(rx, cancel.clone()).instrument(span));

        Self {
            sender_id,
            inbox,
            snapshot,
            accepted: 0,
            cancel,
            task: Some(task),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Queue a message for this sender.
    ///
    /// Hands the message back if the worker has been stopped.
    pub fn accept(&mut self, message: InboundMessage) -> Result<(), InboundMessage> {
        if self.cancel.is_cancelled() {
            return Err(message);
        }
        self.inbox.send(message).map_err(|e| e.0)?;
        self.accepted += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn phase(&self) -> AggregatorPhase {
        self.snapshot.borrow().phase
    }

    /// Messages accepted through this handle.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True when the worker holds no messages, runs no turn, has drained
    /// everything ever accepted, and has been quiet for at least `idle_for`.
    pub fn is_reclaimable(&self, idle_for: Duration) -> bool {
        let snapshot = self.snapshot.borrow();
        snapshot.phase == AggregatorPhase::Idle
            && snapshot.received == self.accepted
            && snapshot.last_activity.elapsed() >= idle_for
    }

    /// Wait until the worker publishes a snapshot matching `predicate`.
    ///
    /// Returns `None` if the worker is gone before that happens.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<AggregatorSnapshot>
    where
        F: FnMut(&AggregatorSnapshot) -> bool,
    {
        self.snapshot
            .wait_for(|s| predicate(s))
            .await
            .ok()
            .map(|s| s.clone())
    }

    /// Cancel the timer and stop the worker without waiting for it.
    ///
    /// Returns the worker task so callers can await its exit once they no
    /// longer hold any lock.
    pub fn cancel(&mut self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.task.take()
    }

    /// Stop the worker and wait until it has exited.
    pub async fn stop(&mut self) {
        if let Some(task) = self.cancel() {
            join_worker(&self.sender_id, task).await;
        }
    }
}

impl Drop for SenderAggregator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SenderAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderAggregator")
            .field("sender_id", &self.sender_id)
            .field("accepted", &self.accepted)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Await a stopped worker, logging if it panicked.
pub(crate) async fn join_worker(sender_id: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await
        && e.is_panic()
    {
        error!(sender_id, "sender aggregator worker panicked");
    }
}

struct Worker {
    debounce: Duration,
    session: Arc<SessionContext>,
    handler: Arc<dyn TurnHandler>,
    sender_id: String,
    buffer: Vec<InboundMessage>,
    deferred: Vec<InboundMessage>,
    /// Debounce deadline; `Some` only while buffering.
    deadline: Option<Instant>,
    in_flight: Option<TurnTask>,
    received: u64,
    turns_completed: u64,
    turns_failed: u64,
    last_activity: Instant,
    snapshot: watch::Sender<AggregatorSnapshot>,
}

impl Worker {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
        cancel: CancellationToken,
    ) {
        debug!("sender aggregator started");
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = join_turn(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.finish_turn(joined);
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && self.in_flight.is_none() =>
                {
                    self.start_turn();
                },
                message = inbox.recv() => match message {
                    Some(message) => self.accept(message),
                    None => break,
                },
            }
            self.publish();
        }
        self.shut_down(inbox);
    }

    fn accept(&mut self, message: InboundMessage) {
        self.received += 1;
        self.last_activity = Instant::now();

        if self.in_flight.is_some() {
            self.deferred.push(message);
            debug!(deferred = self.deferred.len(), "turn in flight, deferring message");
            return;
        }

        self.buffer.push(message);
        // Replacing the deadline cancels the previous timer.
        self.deadline = Some(Instant::now() + self.debounce);
    }

    fn start_turn(&mut self) {
        self.deadline = None;
        debug_assert!(
            self.in_flight.is_none(),
            "debounce timer fired while a turn was in flight"
        );
        if self.in_flight.is_some() {
            error!("debounce timer fired while a turn was in flight");
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        if batch.is_empty() {
            return;
        }
        debug!(batch_len = batch.len(), "starting turn");

        let session = Arc::clone(&self.session);
        let handler = Arc::clone(&self.handler);
        let sender_id = self.sender_id.clone();
        let turn = async move { handler.handle_turn(&session, &sender_id, batch).await };
        self.in_flight = Some(tokio::spawn(turn.in_current_span()));
    }

    fn finish_turn(&mut self, joined: Result<Result<(), TurnError>, JoinError>) {
        match joined {
            Ok(Ok(())) => {
                self.turns_completed += 1;
                debug!("turn completed");
            },
            Ok(Err(e)) => {
                self.turns_failed += 1;
                warn!(error = %e, "turn handler failed");
            },
            Err(e) if e.is_panic() => {
                self.turns_failed += 1;
                error!("turn handler panicked");
            },
            Err(e) => {
                self.turns_failed += 1;
                warn!(error = %e, "turn task was cancelled");
            },
        }
        self.last_activity = Instant::now();

        if !self.deferred.is_empty() {
            // The buffer was drained when the turn started.
            self.buffer.append(&mut self.deferred);
            self.deadline = Some(Instant::now() + self.debounce);
            debug!(
                replayed = self.buffer.len(),
                "replaying messages deferred during turn"
            );
        }
    }

    fn shut_down(&mut self, mut inbox: mpsc::UnboundedReceiver<InboundMessage>) {
        self.deadline = None;
        inbox.close();
        let mut dropped = self.buffer.len() + self.deferred.len();
        while inbox.try_recv().is_ok() {
            dropped += 1;
        }
        self.buffer.clear();
        self.deferred.clear();

        // The running turn finishes on its own; its result is only logged.
        if let Some(turn) = self.in_flight.take() {
            debug!("sender aggregator stopped with a turn in flight, ignoring its result");
            tokio::spawn(
                async move {
                    if let Ok(Err(e)) = turn.await {
                        debug!(error = %e, "ignored turn finished with an error");
                    }
                }
                .in_current_span(),
            );
        }
        if dropped > 0 {
            warn!(dropped, "discarding unprocessed messages on stop");
        }
        self.publish();
        debug!("sender aggregator stopped");
    }

    fn phase(&self) -> AggregatorPhase {
        if self.in_flight.is_some() {
            AggregatorPhase::Processing
        } else if !self.buffer.is_empty() {
            AggregatorPhase::Buffering
        } else {
            AggregatorPhase::Idle
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(AggregatorSnapshot {
            phase: self.phase(),
            buffered: self.buffer.len(),
            deferred: self.deferred.len(),
            received: self.received,
            turns_completed: self.turns_completed,
            turns_failed: self.turns_failed,
            last_activity: self.last_activity,
        });
    }
}

async fn join_turn(slot: &mut Option<TurnTask>) -> Result<Result<(), TurnError>, JoinError> {
    match slot {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
