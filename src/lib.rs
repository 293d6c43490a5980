//! # Room Sync Client
//!
//! Client-side room synchronization for round-based multiplayer games played
//! over a relay.
//!
//! The relay forwards frames between clients and pushes room state, but never
//! decides when a round is over. Each client works that out for itself:
//!
//! - [`ConnectionAdapter`] keeps one logical connection alive across drops,
//!   reconnecting with capped exponential backoff and jitter.
//! - [`RoomStateStore`] merges `STATE` patches into one canonical room view.
//! - [`LeaderboardEngine`] derives ranked, streak-aware standings from round
//!   results.
//! - [`ReadinessCoordinator`] runs the per-round readiness protocol: signal,
//!   wait for quorum, and fall back on a countdown and grace period so a round
//!   always ends exactly once.
//!
//! [`RoomSession`] wires all four together for the common case.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketConnector`](transports::WebSocketConnector)
//! - **Typed events**: one observer list per event type, unsubscribed by
//!   dropping the returned [`Subscription`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use room_sync_client::{Collaborators, RoomSession, SessionConfig, SessionEvent};
//! use room_sync_client::transports::WebSocketConnector;
//!
//! let mut session = RoomSession::join(
//!     WebSocketConnector::new("wss://relay.example/rooms"),
//!     "ROOM42",
//!     credential,
//!     SessionConfig::default(),
//!     Collaborators::default(),
//! )
//! .await?;
//!
//! session.submit_guess(1, serde_json::json!({"lat": 48.85, "lng": 2.35}));
//! session.finish_round();
//!
//! if let Some(SessionEvent::RoundAdvanced(advance)) = session.next_event().await {
//!     for standing in session.standings() {
//!         println!("{} {}", standing.entry.rank, standing.entry.display_name);
//!     }
//! }
//! ```

pub mod backoff;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod leaderboard;
pub mod listeners;
pub mod protocol;
pub mod readiness;
pub mod session;
pub mod store;
mod timer;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use collaborators::{AvatarResolver, Collaborators, ProfileLookup};
pub use config::{ConnectionConfig, ReadinessConfig, SessionConfig};
pub use connection::{
    ConnectionAdapter, ConnectionHandle, ConnectionState, ConnectionStatus, FrameSink,
};
pub use error::{ConnectionError, Result, RoomSyncError};
pub use leaderboard::LeaderboardEngine;
pub use listeners::{Listeners, Subscription};
pub use protocol::{ClientFrame, PlayerId, RoomPatch, ServerFrame};
pub use readiness::{Advance, AdvanceReason, ReadinessCoordinator, ReadinessHandle, ReadinessStatus};
pub use session::{RoomSession, SessionEvent, Standing};
pub use store::{RoomState, RoomStateStore};
pub use transport::{Connector, Transport};
