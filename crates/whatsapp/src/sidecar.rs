//! WebSocket link to the bridge sidecar.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    switchboard_channels::{ConnectionEvent, Error, EventSender, Result},
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{GatewayMessage, SidecarMessage};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SidecarSettings {
    pub url: String,
    pub connect_retries: u32,
    pub send_timeout: Duration,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9876".into(),
            connect_retries: 10,
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// What the reader task reports.
#[derive(Debug)]
pub enum SidecarEvent {
    Frame(SidecarMessage),
    Closed,
}

pub type EventCallback = Arc<dyn Fn(SidecarEvent) + Send + Sync>;

#[derive(Debug)]
struct SendOutcome {
    success: bool,
    error: Option<String>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<SendOutcome>>>>;

/// A live WebSocket connection to the sidecar.
pub struct SidecarHandle {
    write_tx: mpsc::UnboundedSender<String>,
    pending: Pending,
    connected: Arc<AtomicBool>,
}

impl SidecarHandle {
    fn spawn(stream: WsStream, on_event: EventCallback) -> Self {
        let (mut ws_sink, mut ws_reader) = stream.split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(text) = write_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "failed to write to sidecar");
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SidecarMessage>(text.as_str()) {
                        Ok(SidecarMessage::SendResult {
                            request_id,
                            success,
                            error,
                            ..
                        }) => resolve(&reader_pending, request_id, SendOutcome { success, error }),
                        Ok(message) => on_event(SidecarEvent::Frame(message)),
                        Err(e) => warn!(error = %e, "unparseable sidecar frame"),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("sidecar closed the connection");
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        warn!(error = %e, "sidecar connection error");
                        break;
                    },
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            // Dropping the senders fails every in-flight request.
            reader_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
            on_event(SidecarEvent::Closed);
        });

        Self {
            write_tx,
            pending,
            connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.write_tx.is_closed()
    }

    /// Queue a frame without waiting for an answer.
    pub fn send(&self, message: &GatewayMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.write_tx
            .send(json)
            .map_err(|_| Error::not_ready("sidecar connection closed"))
    }

    /// Send a frame and wait for the sidecar's `send_result` for `request_id`.
    pub async fn request(
        &self,
        request_id: &str,
        message: &GatewayMessage,
        timeout: Duration,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(request_id.to_string(), tx);
        if let Err(e) = self.send(message) {
            self.pending_map().remove(request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(SendOutcome { success: true, .. })) => Ok(()),
            Ok(Ok(SendOutcome { error, .. })) => Err(Error::failed(
                error.unwrap_or_else(|| "sidecar rejected the message".into()),
            )),
            Ok(Err(_)) => Err(Error::not_ready(
                "sidecar connection closed before the send completed",
            )),
            Err(_) => {
                self.pending_map().remove(request_id);
                Err(Error::timeout("send message"))
            },
        }
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<SendOutcome>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn resolve(pending: &Pending, request_id: String, outcome: SendOutcome) {
    let waiter = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&request_id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(outcome);
        },
        None => debug!(request_id, "send result for unknown request"),
    }
}

/// Connect to the sidecar, retrying with backoff while it starts up.
pub async fn connect_with_retry(
    url: &str,
    on_event: EventCallback,
    retries: u32,
) -> Result<SidecarHandle> {
    let attempts = retries.max(1);
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect_async(url).await {
            Ok((stream, _response)) => {
                info!(url, "connected to sidecar");
                return Ok(SidecarHandle::spawn(stream, on_event));
            },
            Err(e) if attempt >= attempts => {
                return Err(Error::external(format!("connecting to sidecar at {url}"), e));
            },
            Err(e) => {
                debug!(attempt, error = %e, "sidecar not reachable yet, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            },
        }
    }
}

type Routes = RwLock<HashMap<String, EventSender>>;

/// The shared sidecar connection plus the account → events routing table.
///
/// Connects lazily on first use and reconnects on the next use after the
/// socket drops.
pub struct SidecarLink {
    settings: SidecarSettings,
    routes: Arc<Routes>,
    handle: tokio::sync::Mutex<Option<Arc<SidecarHandle>>>,
}

impl SidecarLink {
    pub fn new(settings: SidecarSettings) -> Self {
        Self {
            settings,
            routes: Arc::new(RwLock::new(HashMap::new())),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SidecarSettings {
        &self.settings
    }

    pub fn register(&self, account_id: &str, events: EventSender) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_id.to_string(), events);
    }

    /// Remove the route for `account_id` if it still points at `events`.
    pub fn unregister(&self, account_id: &str, events: &EventSender) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes
            .get(account_id)
            .is_some_and(|current| current.same_channel(events))
        {
            routes.remove(account_id);
        }
    }

    pub fn is_registered(&self, account_id: &str) -> bool {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(account_id)
    }

    /// The current handle, connecting if there is none or it has dropped.
    pub async fn ensure_connected(&self) -> Result<Arc<SidecarHandle>> {
        let mut handle = self.handle.lock().await;
        if let Some(existing) = handle.as_ref()
            && existing.is_connected()
        {
            return Ok(Arc::clone(existing));
        }

        let routes = Arc::clone(&self.routes);
        let on_event: EventCallback = Arc::new(move |event| dispatch(&routes, event));
        let connected = Arc::new(
            connect_with_retry(&self.settings.url, on_event, self.settings.connect_retries).await?,
        );
        *handle = Some(Arc::clone(&connected));
        Ok(connected)
    }

    /// The current handle if it is still connected. Never connects.
    pub async fn connected(&self) -> Option<Arc<SidecarHandle>> {
        self.handle
            .lock()
            .await
            .as_ref()
            .filter(|h| h.is_connected())
            .map(Arc::clone)
    }
}

fn dispatch(routes: &Routes, event: SidecarEvent) {
    let routes = routes.read().unwrap_or_else(|e| e.into_inner());
    match event {
        SidecarEvent::Frame(SidecarMessage::Error { account_id, error }) => {
            warn!(account_id = ?account_id, error, "sidecar reported an error");
        },
        SidecarEvent::Frame(message) => {
            let Some((account_id, event)) = message.into_event() else {
                return;
            };
            match routes.get(&account_id) {
                Some(events) => {
                    if events.send(event).is_err() {
                        debug!(account_id, "session for account is gone");
                    }
                },
                None => debug!(account_id, "frame for unknown account"),
            }
        },
        SidecarEvent::Closed => {
            for events in routes.values() {
                let _ = events.send(ConnectionEvent::Disconnected {
                    reason: "sidecar connection closed".into(),
                });
            }
        },
    }
}
