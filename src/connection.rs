//! Reconnecting connection adapter for one room.
//!
//! [`ConnectionAdapter`] owns a background connection loop task. The loop opens
//! transports through a [`Connector`], decodes inbound frames and dispatches
//! them to typed subscribers, and reconnects with exponential backoff when the
//! transport drops. Status is published on a [`tokio::sync::watch`] channel and
//! to `on_status` subscribers.
//!
//! Sending is fire-and-forget and at-most-once. [`ConnectionAdapter::send`]
//! returns `false` when the adapter is not `Connected`; frames queued on a
//! connection that then drops are discarded with it and never replayed.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut adapter = ConnectionAdapter::new(connector, ConnectionConfig::default());
//! let _state = adapter.on_state(|patch| store.apply_patch(patch));
//! let me = adapter.connect("ROOM42", credential).await?;
//!
//! if !adapter.send(&ClientFrame::PlayerReadyToggle { is_ready: true }) {
//!     // not connected; caller decides on a fallback
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::backoff::{duration_ms, Backoff};
use crate::config::ConnectionConfig;
use crate::credential;
use crate::error::{ConnectionError, Result, RoomSyncError};
use crate::listeners::{Listeners, Subscription};
use crate::protocol::{ClientFrame, PlayerId, ResultsReadyPayload, RoomPatch, ServerFrame};
use crate::transport::{Connector, Transport};

/// Longest slice of an undecodable frame echoed into the logs.
const MAX_LOGGED_FRAME: usize = 256;

// ── State ───────────────────────────────────────────────────────────

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts are exhausted; nothing retries automatically.
    PermanentlyFailed,
}

/// Snapshot of the connection, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Failed cycles since the last successful connect.
    pub attempt: u32,
    /// Un-jittered delay of the current (or last) reconnect wait.
    pub backoff_ms: u64,
}

impl ConnectionState {
    fn new(status: ConnectionStatus, attempt: u32, backoff_ms: u64) -> Self {
        Self {
            status,
            attempt,
            backoff_ms,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

// ── Frame sink ──────────────────────────────────────────────────────

/// Something outbound frames can be handed to.
///
/// Returns `true` when the frame was accepted for sending and `false` when it
/// was dropped; no implementation retries or queues.
pub trait FrameSink: Send + Sync + 'static {
    fn send(&self, frame: &ClientFrame) -> bool;
}

// ── Shared state ────────────────────────────────────────────────────

#[derive(Default)]
struct EventListeners {
    state: Listeners<RoomPatch>,
    results_ready: Listeners<ResultsReadyPayload>,
    player_left: Listeners<PlayerId>,
    status: Listeners<ConnectionState>,
    error: Listeners<ConnectionError>,
}

/// State shared between the adapter, its handles, and the connection loop.
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    /// Outbound queue of the live connection, `None` between connections.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    player_id: Mutex<Option<PlayerId>>,
    listeners: EventListeners,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            state_tx,
            outbound: Mutex::new(None),
            player_id: Mutex::new(None),
            listeners: EventListeners::default(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn publish(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(
                status = ?state.status,
                attempt = state.attempt,
                backoff_ms = state.backoff_ms,
                "connection state changed"
            );
            self.listeners.status.emit(&state);
        }
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<String>>) {
        *self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = tx;
    }

    fn player_id(&self) -> Option<PlayerId> {
        self.player_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn send(&self, frame: &ClientFrame) -> bool {
        let state = self.state();
        if !state.is_connected() {
            warn!(
                frame = frame.kind(),
                status = ?state.status,
                "not connected, dropping outbound frame"
            );
            return false;
        }

        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                error!(frame = frame.kind(), "failed to serialize frame: {e}");
                return false;
            }
        };

        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref().map(|tx| tx.send(json)) {
            Some(Ok(())) => {
                debug!(frame = frame.kind(), "queued outbound frame");
                true
            }
            _ => {
                warn!(frame = frame.kind(), "connection closing, dropping outbound frame");
                false
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                let raw: String = text.chars().take(MAX_LOGGED_FRAME).collect();
                warn!(raw = %raw, "dropping undecodable frame: {e}");
                return;
            }
        };

        debug!(frame = frame.kind(), "frame received");
        match frame {
            ServerFrame::State(patch) => self.listeners.state.emit(&patch),
            ServerFrame::PlayerLeft { player_id } => self.listeners.player_left.emit(&player_id),
            ServerFrame::ResultsReady(payload) => self.listeners.results_ready.emit(&payload),
        }
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// Cheap, clonable send/inspect handle onto a [`ConnectionAdapter`].
///
/// Handles stay valid across reconnects and after the adapter disconnects
/// (sends then return `false`).
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// See [`ConnectionAdapter::send`].
    pub fn send(&self, frame: &ClientFrame) -> bool {
        self.shared.send(frame)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.shared.player_id()
    }
}

impl FrameSink for ConnectionHandle {
    fn send(&self, frame: &ClientFrame) -> bool {
        self.shared.send(frame)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &self.shared.state())
            .finish()
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// One logical, self-healing connection to a room.
pub struct ConnectionAdapter<C: Connector> {
    connector: Arc<C>,
    config: ConnectionConfig,
    shared: Arc<Shared>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl<C: Connector> ConnectionAdapter<C> {
    /// Create a disconnected adapter.
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared: Arc::new(Shared::new()),
            task: None,
            shutdown_tx: None,
        }
    }

    /// Connect to `room_id`, presenting `credential`.
    ///
    /// The caller's player id is read from the credential before any network
    /// activity and returned on success. The background loop keeps running
    /// (and reconnecting) until [`disconnect`](Self::disconnect).
    ///
    /// If the adapter is already connected it is disconnected first.
    ///
    /// # Errors
    ///
    /// - [`RoomSyncError::InvalidCredential`] if no subject can be decoded.
    /// - [`RoomSyncError::PermanentlyFailed`] if every attempt failed.
    pub async fn connect(
        &mut self,
        room_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<PlayerId> {
        let room_id = room_id.into();
        let credential = credential.into();
        let player_id = credential::subject(&credential)?;

        if self.task.is_some() {
            self.disconnect().await;
        }

        *self
            .shared
            .player_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(player_id.clone());
        info!(room = %room_id, player = %player_id, "connecting to room");

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.task = Some(tokio::spawn(connection_loop(
            Arc::clone(&self.connector),
            room_id,
            credential,
            self.config.clone(),
            Arc::clone(&self.shared),
            ready_tx,
            shutdown_rx,
        )));
        self.shutdown_tx = Some(shutdown_tx);

        match ready_rx.await {
            Ok(Ok(())) => Ok(player_id),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RoomSyncError::NotConnected),
        }
    }

    /// Send a frame on the live connection.
    ///
    /// Returns `false`, after logging a warning, when not `Connected`. There is
    /// no retry queue: a frame that cannot go out now is dropped.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        self.shared.send(frame)
    }

    /// Close the connection and stop reconnecting.
    ///
    /// A pending reconnect wait is cancelled immediately. The loop is given
    /// `shutdown_timeout` to close the transport before it is aborted.
    pub async fn disconnect(&mut self) {
        debug!("disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set_outbound(None);
        if self.shared.state().status != ConnectionStatus::PermanentlyFailed {
            self.shared
                .publish(ConnectionState::new(ConnectionStatus::Disconnected, 0, 0));
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The caller's own player id, known from the moment `connect` is called.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.shared.player_id()
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// `STATE` patches, in arrival order.
    pub fn on_state<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RoomPatch) + Send + Sync + 'static,
    {
        self.shared.listeners.state.subscribe(handler)
    }

    /// Inbound `results-ready` frames.
    pub fn on_results_ready<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ResultsReadyPayload) + Send + Sync + 'static,
    {
        self.shared.listeners.results_ready.subscribe(handler)
    }

    /// `PLAYER_LEFT` notifications.
    pub fn on_player_left<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PlayerId) + Send + Sync + 'static,
    {
        self.shared.listeners.player_left.subscribe(handler)
    }

    /// Every connection state transition.
    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.shared.listeners.status.subscribe(handler)
    }

    /// Permanent connection failures.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionError) + Send + Sync + 'static,
    {
        self.shared.listeners.error.subscribe(handler)
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAdapter")
            .field("state", &self.shared.state())
            .field("player_id", &self.shared.player_id())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl<C: Connector> Drop for ConnectionAdapter<C> {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

enum ConnectionEnd {
    Shutdown,
    Dropped(String),
}

/// Connect, serve, and reconnect until shut down or out of attempts.
async fn connection_loop<C: Connector>(
    connector: Arc<C>,
    room_id: String,
    credential: String,
    config: ConnectionConfig,
    shared: Arc<Shared>,
    ready_tx: oneshot::Sender<Result<()>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // Resolves the pending `connect` call on the first Connected or on giving up.
    let mut ready = Some(ready_tx);
    let backoff = Backoff::from_config(&config);
    let mut attempt: u32 = 0;
    let mut backoff_ms: u64 = 0;

    loop {
        shared.publish(ConnectionState::new(
            ConnectionStatus::Connecting,
            attempt,
            backoff_ms,
        ));

        let opened = tokio::select! {
            _ = &mut shutdown_rx => break,
            opened = connector.connect(&room_id, &credential) => opened,
        };

        let last_error = match opened {
            Ok(transport) => {
                attempt = 0;
                backoff_ms = 0;
                match serve(transport, &shared, &mut ready, &mut shutdown_rx).await {
                    ConnectionEnd::Shutdown => break,
                    ConnectionEnd::Dropped(reason) => reason,
                }
            }
            Err(e) => {
                warn!(room = %room_id, attempt, "connect attempt failed: {e}");
                e.to_string()
            }
        };

        attempt = attempt.saturating_add(1);
        if attempt > config.max_attempts {
            let attempts = config.max_attempts;
            error!(room = %room_id, attempts, "giving up on room connection: {last_error}");
            shared.publish(ConnectionState::new(
                ConnectionStatus::PermanentlyFailed,
                attempts,
                backoff_ms,
            ));
            shared
                .listeners
                .error
                .emit(&ConnectionError::AttemptsExhausted {
                    attempts,
                    last_error,
                });
            if let Some(tx) = ready.take() {
                let _ = tx.send(Err(RoomSyncError::PermanentlyFailed { attempts }));
            }
            return;
        }

        let delay = backoff.delay(attempt);
        backoff_ms = duration_ms(delay);
        shared.publish(ConnectionState::new(
            ConnectionStatus::Reconnecting,
            attempt,
            backoff_ms,
        ));
        info!(room = %room_id, attempt, backoff_ms, "reconnecting after: {last_error}");

        tokio::select! {
            _ = &mut shutdown_rx => break,
            () = tokio::time::sleep(backoff.jittered(delay)) => {}
        }
    }

    shared.set_outbound(None);
    shared.publish(ConnectionState::new(ConnectionStatus::Disconnected, 0, 0));
    debug!(room = %room_id, "connection loop exited");
}

/// Pump one live transport until it drops or shutdown is requested.
async fn serve(
    mut transport: impl Transport,
    shared: &Shared,
    ready: &mut Option<oneshot::Sender<Result<()>>>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> ConnectionEnd {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    shared.set_outbound(Some(out_tx));
    shared.publish(ConnectionState::new(ConnectionStatus::Connected, 0, 0));
    if let Some(tx) = ready.take() {
        let _ = tx.send(Ok(()));
    }

    let end = loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                if let Err(e) = transport.close().await {
                    debug!("transport close failed: {e}");
                }
                break ConnectionEnd::Shutdown;
            }

            Some(json) = out_rx.recv() => {
                if let Err(e) = transport.send(json).await {
                    warn!("transport send error: {e}");
                    break ConnectionEnd::Dropped(e.to_string());
                }
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => shared.dispatch(&text),
                Some(Err(e)) => {
                    warn!("transport receive error: {e}");
                    break ConnectionEnd::Dropped(e.to_string());
                }
                None => {
                    debug!("transport closed by relay");
                    break ConnectionEnd::Dropped("connection closed by relay".into());
                }
            },
        }
    };

    // Frames still queued for this connection are dropped with the receiver.
    shared.set_outbound(None);
    end
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn send_without_connection_returns_false() {
        let shared = Shared::new();
        assert!(!shared.send(&ClientFrame::StartGame));
    }

    #[test]
    fn publish_skips_listeners_when_unchanged() {
        let shared = Shared::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = shared
            .listeners
            .status
            .subscribe(move |s: &ConnectionState| sink.lock().unwrap().push(s.status));

        let connecting = ConnectionState::new(ConnectionStatus::Connecting, 0, 0);
        shared.publish(connecting);
        shared.publish(connecting);
        shared.publish(ConnectionState::new(ConnectionStatus::Connected, 0, 0));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn dispatch_routes_by_frame_type() {
        let shared = Shared::new();
        let left = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&left);
        let _sub = shared
            .listeners
            .player_left
            .subscribe(move |id: &PlayerId| sink.lock().unwrap().push(id.clone()));

        shared.dispatch(r#"{"type":"PLAYER_LEFT","playerId":"p2"}"#);
        shared.dispatch(r#"{"type":"SOMETHING_NEW","x":1}"#);
        shared.dispatch("not json at all");

        assert_eq!(*left.lock().unwrap(), vec!["p2".to_string()]);
    }

    #[test]
    fn send_while_connected_reaches_outbound_queue() {
        let shared = Shared::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        shared.set_outbound(Some(tx));
        shared.publish(ConnectionState::new(ConnectionStatus::Connected, 0, 0));

        assert!(shared.send(&ClientFrame::PlayerReadyToggle { is_ready: true }));
        let json = rx.try_recv().unwrap();
        assert_eq!(json, r#"{"type":"PLAYER_READY_TOGGLE","isReady":true}"#);
    }
}
