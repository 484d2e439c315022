//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    switchboard_channels::ConnectionHandle,
    switchboard_common::types::{InboundMessage, OutboundPayload},
    tokio::time::Instant,
};

use crate::turn::{SessionContext, TurnError, TurnHandler};

pub(crate) struct NullConnection;

#[async_trait]
impl ConnectionHandle for NullConnection {
    async fn initialize(&self, _credentials_path: &Path) -> switchboard_channels::Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> switchboard_channels::Result<()> {
        Ok(())
    }

    async fn send(
        &self,
        _recipient: &str,
        _payload: &OutboundPayload,
    ) -> switchboard_channels::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TurnRecord {
    pub sender_id: String,
    pub bodies: Vec<String>,
    pub started: Instant,
    pub ended: Option<Instant>,
}

#[derive(Default)]
pub(crate) struct RecordingHandler {
    delay: Duration,
    fail_first: usize,
    panic_first: usize,
    pub calls: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    active: Mutex<HashMap<String, usize>>,
    turns: Mutex<Vec<TurnRecord>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_first: n,
            ..Self::default()
        })
    }

    pub fn panicking_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            panic_first: n,
            ..Self::default()
        })
    }

    pub fn turns(&self) -> Vec<TurnRecord> {
        self.turns.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<Vec<String>> {
        self.turns().into_iter().map(|t| t.bodies).collect()
    }
}

#[async_trait]
impl TurnHandler for RecordingHandler {
    async fn handle_turn(
        &self,
        _session: &SessionContext,
        sender_id: &str,
        batch: Vec<InboundMessage>,
    ) -> Result<(), TurnError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut turns = self.turns.lock().unwrap();
            turns.push(TurnRecord {
                sender_id: sender_id.to_string(),
                bodies: batch.into_iter().map(|m| m.body).collect(),
                started: Instant::now(),
                ended: None,
            });
            turns.len() - 1
        };
        {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(sender_id.to_string()).or_default();
            *count += 1;
            self.max_concurrent.fetch_max(*count, Ordering::SeqCst);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(count) = self.active.lock().unwrap().get_mut(sender_id) {
            *count -= 1;
        }
        self.turns.lock().unwrap()[index].ended = Some(Instant::now());

        if call < self.panic_first {
            panic!("turn handler exploded");
        }
        if call < self.fail_first {
            return Err(TurnError::failed("pipeline unavailable"));
        }
        Ok(())
    }
}
