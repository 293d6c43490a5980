//! Wire frames and shared data types for the room relay protocol.
//!
//! Every frame is a JSON object tagged by its `type` field, with the payload
//! flattened beside the tag:
//!
//! ```json
//! {"type": "results-ready", "roundNumber": 3, "ready": true}
//! ```
//!
//! Payload field names are camelCase on the wire. Frames with an unknown
//! `type` fail to decode and are dropped by the connection loop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Type aliases ────────────────────────────────────────────────────

/// Stable player identity, taken from the credential's subject claim.
pub type PlayerId = String;

// ── Room data ───────────────────────────────────────────────────────

/// A player as seen in the room roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: PlayerId,
    #[serde(default)]
    pub display_name: String,
    /// Opaque avatar handle, resolved by an [`AvatarResolver`](crate::collaborators::AvatarResolver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub has_submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time_ms: Option<f64>,
}

impl PlayerState {
    /// Create a roster entry with default flags.
    pub fn new(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            is_host: false,
            is_ready: false,
            has_submitted: false,
            submission_time_ms: None,
        }
    }
}

/// One player's outcome for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub player_id: PlayerId,
    pub distance_or_error: f64,
    pub score: f64,
    pub submission_time_ms: f64,
    pub is_correct: bool,
}

/// Derived standings for one player.
///
/// Produced by [`LeaderboardEngine`](crate::leaderboard::LeaderboardEngine);
/// also the shape of the `leaderboard` field in `STATE` patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub total_score: f64,
    /// `rounds_won / rounds_played`, 0 when no rounds were played.
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub rounds_won: u32,
    #[serde(default)]
    pub rounds_played: u32,
    #[serde(default)]
    pub average_distance: f64,
    /// Fastest submission time in milliseconds, 0 when no rounds were played.
    #[serde(default)]
    pub fastest_submission: f64,
    /// Consecutive correct results counting back from the latest round.
    #[serde(default)]
    pub streak: u32,
    /// 1-based position in the ranking.
    #[serde(default)]
    pub rank: u32,
}

/// Phase of the current round as reported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    #[default]
    Guessing,
    Results,
    Finished,
    /// Any phase this client does not know about.
    #[serde(other)]
    Other,
}

/// The `round` field of the room state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundInfo {
    pub number: u32,
    #[serde(default)]
    pub phase: RoundPhase,
    /// Participant count the relay reports for this round, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<u32>,
    /// Results submitted so far for this round.
    #[serde(default)]
    pub results: Vec<RoundResult>,
}

impl RoundInfo {
    /// A fresh round with no results.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            phase: RoundPhase::Guessing,
            participants: None,
            results: Vec::new(),
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// A partial room state keyed by top-level field name.
///
/// Kept as raw JSON so the store can validate each field independently and
/// normalize keyed maps; see [`RoomStateStore::apply_patch`](crate::store::RoomStateStore::apply_patch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomPatch(pub Map<String, Value>);

impl RoomPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a top-level field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Raw value of a top-level field, if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterate fields in the order they appeared on the wire.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payload of the bidirectional `results-ready` frame.
///
/// Outbound, a client sends only `roundNumber` and `ready`. Inbound, the relay
/// adds its aggregate `readyCount` and `totalPlayers` for the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsReadyPayload {
    pub round_number: u32,
    #[serde(default = "default_ready")]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

fn default_ready() -> bool {
    true
}

impl ResultsReadyPayload {
    /// The outbound readiness signal for `round_number`.
    pub fn signal(round_number: u32) -> Self {
        Self {
            round_number,
            ready: true,
            ready_count: None,
            total_players: None,
            player_id: None,
        }
    }

    /// An inbound relay aggregate.
    pub fn aggregate(round_number: u32, ready_count: u32, total_players: u32) -> Self {
        Self {
            round_number,
            ready: true,
            ready_count: Some(ready_count),
            total_players: Some(total_players),
            player_id: None,
        }
    }
}

// ── Frames ──────────────────────────────────────────────────────────

/// Frames sent from this client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Submit a gameplay action for a round.
    #[serde(rename = "PLAYER_MOVE")]
    PlayerMove { round: u32, guess: Value },
    /// Lobby readiness toggle.
    #[serde(rename = "PLAYER_READY_TOGGLE", rename_all = "camelCase")]
    PlayerReadyToggle { is_ready: bool },
    /// Host-only: begin the match.
    #[serde(rename = "START_GAME")]
    StartGame,
    /// Best-effort broadcast of locally computed standings.
    #[serde(rename = "LEADERBOARD_UPDATE")]
    LeaderboardUpdate { leaderboard: Vec<LeaderboardEntry> },
    /// This client has finished the round.
    #[serde(rename = "results-ready")]
    ResultsReady(ResultsReadyPayload),
}

impl ClientFrame {
    /// Wire tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerMove { .. } => "PLAYER_MOVE",
            Self::PlayerReadyToggle { .. } => "PLAYER_READY_TOGGLE",
            Self::StartGame => "START_GAME",
            Self::LeaderboardUpdate { .. } => "LEADERBOARD_UPDATE",
            Self::ResultsReady(_) => "results-ready",
        }
    }
}

/// Frames received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Room snapshot or partial patch.
    #[serde(rename = "STATE")]
    State(RoomPatch),
    /// A player left the room.
    #[serde(rename = "PLAYER_LEFT", rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },
    /// Readiness aggregate (or a peer's echoed signal).
    #[serde(rename = "results-ready")]
    ResultsReady(ResultsReadyPayload),
}

impl ServerFrame {
    /// Wire tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "STATE",
            Self::PlayerLeft { .. } => "PLAYER_LEFT",
            Self::ResultsReady(_) => "results-ready",
        }
    }
}
