// Real-time channel: a reconnecting WebSocket client with named-event
// listeners and per-project rooms.

pub mod events;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::api::segment;
use events::{Frame, JOIN_PROJECT, LEAVE_PROJECT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnection gave up after this many attempts.
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub url: String,
    pub token: Option<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl SocketOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
        }
    }

    fn connect_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.url, sep, segment(token))
            }
            None => self.url.clone(),
        }
    }
}

struct Inner {
    options: SocketOptions,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Handler)>>>,
    rooms: RwLock<BTreeSet<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    state_tx: watch::Sender<ConnectionState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<Inner>,
}

impl SocketClient {
    pub fn new(options: SocketOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                options,
                listeners: RwLock::new(HashMap::new()),
                rooms: RwLock::new(BTreeSet::new()),
                outbound: Mutex::new(None),
                state_tx,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Starts the connection loop. A no-op while a loop is already running.
    pub async fn connect(&self) {
        let mut worker = self.inner.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(run(inner)));
    }

    pub async fn disconnect(&self) {
        if let Some(handle) = self.inner.worker.lock().await.take() {
            handle.abort();
        }
        *self.inner.outbound.lock().await = None;
        self.inner.state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("socket disconnected by client");
    }

    pub async fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        self.inner
            .listeners
            .write()
            .await
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub async fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write().await;
        let mut removed = false;
        for handlers in listeners.values_mut() {
            let before = handlers.len();
            handlers.retain(|(listener, _)| *listener != id);
            removed |= handlers.len() != before;
        }
        listeners.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    /// Sends an event. Returns false when there is no live connection.
    pub async fn emit(&self, event: &str, data: Value) -> bool {
        let text = match serde_json::to_string(&Frame::new(event, data)) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(event, error = %err, "failed to encode frame");
                return false;
            }
        };
        match self.inner.outbound.lock().await.as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => {
                tracing::debug!(event, "emit dropped, socket not connected");
                false
            }
        }
    }

    /// Joins a project room. Rooms are re-joined after every reconnect.
    pub async fn join_project(&self, project_id: &str) {
        let inserted = self.inner.rooms.write().await.insert(project_id.to_string());
        if inserted {
            self.emit(JOIN_PROJECT, json!({ "projectId": project_id }))
                .await;
        }
    }

    pub async fn leave_project(&self, project_id: &str) {
        let removed = self.inner.rooms.write().await.remove(project_id);
        if removed {
            self.emit(LEAVE_PROJECT, json!({ "projectId": project_id }))
                .await;
        }
    }

    pub async fn rooms(&self) -> Vec<String> {
        self.inner.rooms.read().await.iter().cloned().collect()
    }

    /// Feeds a frame to the listeners as if the server had sent it.
    #[cfg(test)]
    pub(crate) async fn inject(&self, text: &str) {
        self.inner.dispatch(text).await;
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    async fn dispatch(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed frame");
                return;
            }
        };

        // Handlers run outside the lock so they may call on/off themselves.
        let handlers: Vec<Handler> = match self.listeners.read().await.get(&frame.event) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        for handler in handlers {
            handler(&frame.data);
        }
    }
}

async fn run(inner: Arc<Inner>) {
    let url = inner.options.connect_url();
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempt = 0;
                tracing::info!(url = %inner.options.url, "socket connected");

                let (mut sink, mut source) = stream.split();
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();

                for room in inner.rooms.read().await.iter() {
                    let frame = Frame::new(JOIN_PROJECT, json!({ "projectId": room }));
                    if let Ok(text) = serde_json::to_string(&frame) {
                        let _ = tx.send(text);
                    }
                }
                *inner.outbound.lock().await = Some(tx);
                inner.set_state(ConnectionState::Connected);

                loop {
                    tokio::select! {
                        Some(text) = rx.recv() => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        msg = source.next() => match msg {
                            Some(Ok(Message::Text(text))) => inner.dispatch(&text).await,
                            Some(Ok(Message::Ping(data))) => {
                                let _ = sink.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                tracing::warn!(error = %err, "socket read failed");
                                break;
                            }
                        }
                    }
                }

                *inner.outbound.lock().await = None;
                tracing::info!("socket connection lost");
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "socket connect failed");
            }
        }

        attempt += 1;
        if attempt > inner.options.reconnect_attempts {
            tracing::warn!(
                attempts = inner.options.reconnect_attempts,
                "giving up on socket, falling back to polling"
            );
            inner.set_state(ConnectionState::Failed {
                attempts: inner.options.reconnect_attempts,
            });
            return;
        }

        inner.set_state(ConnectionState::Disconnected);
        tokio::time::sleep(inner.options.reconnect_delay * attempt).await;
    }
}
