//! Transport abstraction for the room relay connection.
//!
//! A [`Transport`] is one live, bidirectional text-frame channel to the relay.
//! Because the connection adapter reconnects on its own, it cannot be handed
//! a single transport; instead it is given a [`Connector`] that opens a fresh
//! transport for a room on every attempt.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use room_sync_client::error::RoomSyncError;
//! use room_sync_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), RoomSyncError> {
//!         // Send one JSON frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RoomSyncError>> {
//!         // Receive the next JSON frame; None when closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RoomSyncError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self, room_id: &str, credential: &str) -> Result<MyTransport, RoomSyncError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomSyncError;

/// A bidirectional text frame transport to the relay.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame;
/// each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the connection loop polls
/// it inside `tokio::select!`, and a cancelled `recv` must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoomSyncError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), RoomSyncError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, RoomSyncError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), RoomSyncError>;
}

/// Opens transports addressed by room id and credential.
///
/// Called once per connection attempt, including every reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Open a new connection to `room_id`, presenting `credential`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a transient failure and retried with backoff
    /// until the adapter's attempt budget runs out.
    async fn connect(&self, room_id: &str, credential: &str)
        -> Result<Self::Transport, RoomSyncError>;
}
