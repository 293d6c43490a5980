#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for room sync client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands out
//! transports (or failures) in order, a [`RecordingSink`] for the readiness
//! coordinator, and helpers for building credentials and relay frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use room_sync_client::protocol::{ClientFrame, ResultsReadyPayload, ServerFrame};
use room_sync_client::{Connector, FrameSink, RoomSyncError, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type Incoming = Option<Result<String, RoomSyncError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A mock transport for integration testing.
///
/// Scripted frames are consumed in order by `recv()`. After the script runs
/// out, frames pushed through the live feed (if any) are delivered; with no
/// feed, `recv()` pends forever so the connection stays up. Delivering `None`
/// ends the connection as if the relay closed it.
pub struct MockTransport {
    incoming: VecDeque<Incoming>,
    feed: Option<mpsc::UnboundedReceiver<Incoming>>,
    /// Recorded outgoing frames.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a transport that plays `incoming` and then idles.
    pub fn new(incoming: Vec<Incoming>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            feed: None,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// Create a transport driven by the returned [`Feed`].
    pub fn live() -> (Self, Feed, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let (mut transport, sent, closed) = Self::new(Vec::new());
        let (tx, rx) = mpsc::unbounded_channel();
        transport.feed = Some(rx);
        (transport, Feed(tx), sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomSyncError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RoomSyncError>> {
        if let Some(item) = self.incoming.pop_front() {
            return item;
        }
        match self.feed.as_mut() {
            Some(feed) => match feed.recv().await {
                Some(item) => item,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), RoomSyncError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Pushes relay frames into a live [`MockTransport`].
#[derive(Clone)]
pub struct Feed(mpsc::UnboundedSender<Incoming>);

impl Feed {
    pub fn frame(&self, json: String) {
        self.0.send(Some(Ok(json))).unwrap();
    }

    /// Make the transport report that the relay closed the connection.
    pub fn close(&self) {
        self.0.send(None).unwrap();
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// One `connect` call seen by a [`MockConnector`].
#[derive(Debug, Clone)]
pub struct ConnectCall {
    pub room_id: String,
    pub credential: String,
    pub at: Instant,
}

/// Hands out scripted transports or failures, one per `connect` call.
///
/// Once the script runs out every further attempt is refused.
pub struct MockConnector {
    script: StdMutex<VecDeque<Result<MockTransport, RoomSyncError>>>,
    pub calls: Arc<StdMutex<Vec<ConnectCall>>>,
}

impl MockConnector {
    pub fn new(
        script: Vec<Result<MockTransport, RoomSyncError>>,
    ) -> (Self, Arc<StdMutex<Vec<ConnectCall>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let connector = Self {
            script: StdMutex::new(VecDeque::from(script)),
            calls: Arc::clone(&calls),
        };
        (connector, calls)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &self,
        room_id: &str,
        credential: &str,
    ) -> Result<MockTransport, RoomSyncError> {
        self.calls.lock().unwrap().push(ConnectCall {
            room_id: room_id.to_owned(),
            credential: credential.to_owned(),
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(refused()))
    }
}

/// The error a connector reports for an unreachable relay.
pub fn refused() -> RoomSyncError {
    RoomSyncError::TransportReceive("connection refused".into())
}

// ── RecordingSink ───────────────────────────────────────────────────

/// A [`FrameSink`] that records every frame offered to it.
#[derive(Clone)]
pub struct RecordingSink {
    accept: Arc<AtomicBool>,
    frames: Arc<StdMutex<Vec<ClientFrame>>>,
}

impl RecordingSink {
    /// A sink that accepts every frame.
    pub fn accepting() -> Self {
        Self {
            accept: Arc::new(AtomicBool::new(true)),
            frames: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A sink that refuses every frame, like a dead connection.
    pub fn refusing() -> Self {
        let sink = Self::accepting();
        sink.accept.store(false, Ordering::SeqCst);
        sink
    }

    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: &ClientFrame) -> bool {
        self.frames.lock().unwrap().push(frame.clone());
        self.accept.load(Ordering::SeqCst)
    }
}

// ── Credentials and frames ──────────────────────────────────────────

/// An unsigned JWT whose subject is `sub`.
pub fn credential_for(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims =
        URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "exp": 4_102_444_800_u64 }).to_string());
    format!("{header}.{claims}.signature")
}

/// A `STATE` frame carrying `patch`.
pub fn state_json(patch: Value) -> String {
    let mut frame = json!({ "type": "STATE" });
    if let (Some(frame), Value::Object(fields)) = (frame.as_object_mut(), patch) {
        frame.extend(fields);
    }
    frame.to_string()
}

/// A relay readiness aggregate.
pub fn results_ready_json(round: u32, ready_count: u32, total_players: u32) -> String {
    serde_json::to_string(&ServerFrame::ResultsReady(ResultsReadyPayload::aggregate(
        round,
        ready_count,
        total_players,
    )))
    .expect("results_ready_json serialization")
}

/// One peer's readiness signal, echoed by the relay without a count.
pub fn peer_ready_json(round: u32, player_id: &str, ready: bool) -> String {
    json!({
        "type": "results-ready",
        "roundNumber": round,
        "ready": ready,
        "playerId": player_id,
    })
    .to_string()
}

pub fn player_left_json(player_id: &str) -> String {
    serde_json::to_string(&ServerFrame::PlayerLeft {
        player_id: player_id.into(),
    })
    .expect("player_left_json serialization")
}

/// Decode every frame a transport sent.
pub fn sent_frames(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientFrame> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|json| serde_json::from_str(json).expect("sent frame decodes"))
        .collect()
}

/// Install a test subscriber once so `RUST_LOG` works when debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
