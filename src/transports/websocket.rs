//! WebSocket transport and room connector using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is what a [`ConnectionAdapter`](crate::connection::ConnectionAdapter)
//! is normally given: it opens one [`WebSocketTransport`] per connection
//! attempt, addressed as `{base_url}/{room_id}?token={credential}`. Both
//! `ws://` and `wss://` base URLs work.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), room_sync_client::RoomSyncError> {
//! use room_sync_client::transports::WebSocketConnector;
//! use room_sync_client::ConnectionAdapter;
//! use room_sync_client::config::ConnectionConfig;
//!
//! let connector = WebSocketConnector::new("wss://relay.example.com/parties/main");
//! let mut adapter = ConnectionAdapter::new(connector, ConnectionConfig::default());
//! let me = adapter.connect("ROOM42", "header.payload.signature").await?;
//! println!("connected as {me}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RoomSyncError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ── Connector ───────────────────────────────────────────────────────

/// Opens a WebSocket per connection attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector for rooms under `base_url`.
    ///
    /// A trailing `/` on the base URL is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            connect_timeout: None,
        }
    }

    /// Fail an attempt that takes longer than `timeout` to open.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// URL for `room_id` with `credential` in the query string.
    pub fn room_url(&self, room_id: &str, credential: &str) -> String {
        format!("{}/{room_id}?token={credential}", self.base_url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(
        &self,
        room_id: &str,
        credential: &str,
    ) -> Result<WebSocketTransport, RoomSyncError> {
        let url = self.room_url(room_id, credential);
        match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(&url, timeout).await,
            None => WebSocketTransport::connect(&url).await,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// A [`Transport`] over one WebSocket connection.
///
/// Text frames carry relay JSON. Binary frames are skipped with a warning;
/// ping/pong is answered by tungstenite itself.
///
/// # Cancel Safety
///
/// `recv` only awaits `StreamExt::next`, which does not consume a frame if
/// cancelled, so it is safe inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::Io`]; the I/O error kind is kept when the
    /// failure came from the socket, otherwise it is `Other`.
    pub async fn connect(url: &str) -> Result<Self, RoomSyncError> {
        // The URL carries the credential, so only the path is logged.
        let target = url.split('?').next().unwrap_or_default();
        tracing::debug!(url = %target, "opening relay WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            RoomSyncError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %target, "relay WebSocket open");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-open stream (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::Timeout`] when the deadline passes first.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, RoomSyncError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| RoomSyncError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomSyncError> {
        if self.closed {
            return Err(RoomSyncError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RoomSyncError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RoomSyncError>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "relay sent close frame");
                    return None;
                }
                Ok(Message::Binary(bytes)) => {
                    tracing::warn!(len = bytes.len(), "skipping binary frame from relay");
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(RoomSyncError::TransportReceive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), RoomSyncError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RoomSyncError::TransportSend(e.to_string()))
    }
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
    use tokio::net::TcpListener;

    /// Accept one WebSocket on a local port, run `handler` on it, and return
    /// the `ws://` URL to reach it.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[test]
    fn room_url_joins_base_room_and_token() {
        let connector = WebSocketConnector::new("wss://relay.test/parties/main/");
        assert_eq!(
            connector.room_url("ROOM1", "a.b.c"),
            "wss://relay.test/parties/main/ROOM1?token=a.b.c"
        );
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketConnector::new("ws://127.0.0.1:1")
            .connect("R", "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomSyncError::Io(_)));
    }

    #[tokio::test]
    async fn connector_opens_transport_that_receives_text() {
        let base = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"STATE"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new(base)
            .connect("ROOM", "x.y.z")
            .await
            .unwrap();
        let text = transport.recv().await.unwrap().unwrap();
        assert_eq!(text, r#"{"type":"STATE"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let base =
            serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&base).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, RoomSyncError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_timeout_reports_timeout() {
        let err = WebSocketConnector::new("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50))
            .connect("R", "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomSyncError::Timeout));
    }
}
