//! Error types for the room sync client.

use thiserror::Error;

/// Errors returned by room sync client operations.
#[derive(Debug, Error)]
pub enum RoomSyncError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires a live connection.
    #[error("not connected to room")]
    NotConnected,

    /// The credential could not be decoded into a player identity.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Reconnect attempts were exhausted; no further automatic retry happens.
    #[error("connection permanently failed after {attempts} attempts")]
    PermanentlyFailed {
        /// Number of reconnect attempts made before giving up.
        attempts: u32,
    },

    /// A host-only action was attempted by a player who is not the host.
    #[error("only the room host can do that")]
    NotHost,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-level failure delivered to `on_error` subscribers.
///
/// Unlike [`RoomSyncError`] this is `Clone` so a single failure can fan out to
/// every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// All reconnect attempts failed.
    #[error("reconnect attempts exhausted after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last transport failure.
        last_error: String,
    },
}

/// A specialized [`Result`] type for room sync client operations.
pub type Result<T> = std::result::Result<T, RoomSyncError>;
