//! A joined room: connection, state, standings and readiness wired together.
//!
//! [`RoomSession::join`] builds every component, subscribes them to one
//! another, and connects. From then on:
//!
//! - `STATE` frames are merged into the [`RoomStateStore`]; `PLAYER_LEFT`
//!   removes the player from the roster.
//! - Every store update feeds the roster size to the readiness coordinator,
//!   enters new rounds, and records round results not seen before into the
//!   [`LeaderboardEngine`]. A round number going backwards, or a finished
//!   match going back to guessing, starts a new match: standings and
//!   readiness are reset.
//! - `results-ready` aggregates go to the readiness coordinator.
//! - Round advancements and permanent connection failures come out of
//!   [`RoomSession::next_event`].
//!
//! ```rust,ignore
//! let mut session = RoomSession::join(
//!     WebSocketConnector::new("wss://relay.example/rooms"),
//!     "ROOM42",
//!     credential,
//!     SessionConfig::default(),
//!     Collaborators::default(),
//! )
//! .await?;
//!
//! while let Some(event) = session.next_event().await {
//!     match event {
//!         SessionEvent::RoundAdvanced(advance) => show_results(advance.round),
//!         SessionEvent::ConnectionFailed(e) => break,
//!     }
//! }
//! session.leave().await;
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::config::SessionConfig;
use crate::connection::{ConnectionAdapter, ConnectionState};
use crate::error::{ConnectionError, Result, RoomSyncError};
use crate::leaderboard::LeaderboardEngine;
use crate::listeners::Subscription;
use crate::protocol::{ClientFrame, LeaderboardEntry, PlayerId, RoundInfo, RoundPhase, RoundResult};
use crate::readiness::{Advance, ReadinessCoordinator, ReadinessHandle, ReadinessStatus};
use crate::store::{RoomState, RoomStateStore};
use crate::transport::Connector;

/// Something the embedding application should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The round is over for this client; show results and move on.
    RoundAdvanced(Advance),
    /// The connection gave up reconnecting. The session is inert until left.
    ConnectionFailed(ConnectionError),
}

/// A ranked leaderboard row with its avatar resolved for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub entry: LeaderboardEntry,
    pub avatar_url: String,
}

/// Leaderboard plus the `(round, player)` pairs already folded into it.
#[derive(Debug, Default)]
struct Tally {
    engine: LeaderboardEngine,
    recorded: HashSet<(u32, PlayerId)>,
    last_round: Option<(u32, RoundPhase)>,
}

/// What one store update meant for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Absorbed {
    round: u32,
    /// Distinct players with a result this round.
    submitted: u32,
    new_match: bool,
}

impl Tally {
    /// Record results of `state`'s round that have not been seen before.
    fn absorb(&mut self, state: &RoomState, collaborators: &Collaborators) -> Option<Absorbed> {
        let round = state.round.as_ref()?;
        let new_match = self.starts_new_match(round);
        if new_match {
            info!(round = round.number, "new match started, clearing standings");
            self.engine.reset();
            self.recorded.clear();
        }
        self.last_round = Some((round.number, round.phase));

        let mut submitted: HashSet<&str> = HashSet::new();

        for result in &round.results {
            submitted.insert(result.player_id.as_str());
            if !self.recorded.insert((round.number, result.player_id.clone())) {
                continue;
            }
            let player = state.player(&result.player_id);
            let display_name = player
                .map(|p| p.display_name.clone())
                .filter(|name| !name.is_empty())
                .or_else(|| collaborators.profiles.display_name(&result.player_id))
                .unwrap_or_else(|| result.player_id.clone());
            let avatar_ref = player.and_then(|p| p.avatar_ref.as_deref());

            debug!(
                round = round.number,
                player = %result.player_id,
                score = result.score,
                "recording round result"
            );
            self.engine
                .record_result(&result.player_id, &display_name, avatar_ref, result.clone());
        }

        Some(Absorbed {
            round: round.number,
            submitted: u32::try_from(submitted.len()).unwrap_or(u32::MAX),
            new_match,
        })
    }

    fn starts_new_match(&self, round: &RoundInfo) -> bool {
        let Some((number, phase)) = self.last_round else {
            return false;
        };
        round.number < number
            || (phase == RoundPhase::Finished && round.phase == RoundPhase::Guessing)
    }
}

/// One client's membership in one room.
pub struct RoomSession<C: Connector> {
    adapter: ConnectionAdapter<C>,
    store: Arc<RoomStateStore>,
    tally: Arc<Mutex<Tally>>,
    readiness: ReadinessCoordinator,
    collaborators: Collaborators,
    self_id: PlayerId,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
    subscriptions: Vec<Subscription>,
}

impl<C: Connector> RoomSession<C> {
    /// Wire up a session and connect to `room_id`.
    ///
    /// # Errors
    ///
    /// Whatever [`ConnectionAdapter::connect`] returns: an undecodable
    /// credential, or a connection that failed permanently.
    pub async fn join(
        connector: C,
        room_id: impl Into<String>,
        credential: impl Into<String>,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let adapter = ConnectionAdapter::new(connector, config.connection);
        let (readiness, mut advance_rx) =
            ReadinessCoordinator::start(adapter.handle(), config.readiness);
        let store = Arc::new(RoomStateStore::new());
        let tally = Arc::new(Mutex::new(Tally::default()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let subscriptions = vec![
            {
                let store = Arc::clone(&store);
                adapter.on_state(move |patch| {
                    store.apply_patch(patch);
                })
            },
            {
                let store = Arc::clone(&store);
                adapter.on_player_left(move |id| {
                    if store.remove_player(id) {
                        info!(player = %id, "player left the room");
                    }
                })
            },
            {
                let readiness = readiness.handle();
                adapter.on_results_ready(move |payload| {
                    readiness.observe_results_ready(payload.clone());
                })
            },
            {
                let events_tx = events_tx.clone();
                adapter.on_error(move |error| {
                    let _ = events_tx.send(SessionEvent::ConnectionFailed(error.clone()));
                })
            },
            store.subscribe(state_observer(
                readiness.handle(),
                Arc::clone(&tally),
                collaborators.clone(),
            )),
        ];

        let forwarder = tokio::spawn(async move {
            while let Some(advance) = advance_rx.recv().await {
                if events_tx.send(SessionEvent::RoundAdvanced(advance)).is_err() {
                    break;
                }
            }
        });

        let mut session = Self {
            adapter,
            store,
            tally,
            readiness,
            collaborators,
            self_id: PlayerId::new(),
            events_rx,
            forwarder: Some(forwarder),
            subscriptions,
        };
        session.self_id = session.adapter.connect(room_id, credential).await?;
        info!(player = %session.self_id, "joined room");
        Ok(session)
    }

    /// Next round advancement or connection failure. `None` once left.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Submit this client's guess for `round`. `false` if not connected.
    pub fn submit_guess(&self, round: u32, guess: Value) -> bool {
        self.adapter.send(&ClientFrame::PlayerMove { round, guess })
    }

    /// Lobby readiness. `false` if not connected.
    pub fn toggle_ready(&self, is_ready: bool) -> bool {
        self.adapter.send(&ClientFrame::PlayerReadyToggle { is_ready })
    }

    /// Ask the relay to start the match.
    ///
    /// # Errors
    ///
    /// - [`RoomSyncError::NotHost`] if the roster does not name this client host.
    /// - [`RoomSyncError::NotConnected`] if the frame could not be sent.
    pub fn start_game(&self) -> Result<()> {
        let state = self.store.snapshot();
        if state.host().map(|p| p.id.as_str()) != Some(self.self_id.as_str()) {
            warn!(player = %self.self_id, "refusing to start game: not the host");
            return Err(RoomSyncError::NotHost);
        }
        if self.adapter.send(&ClientFrame::StartGame) {
            Ok(())
        } else {
            Err(RoomSyncError::NotConnected)
        }
    }

    /// Declare this client done with the current round.
    pub fn finish_round(&self) {
        self.readiness.mark_ready();
    }

    /// Share the local standings with the room. Best effort.
    pub fn broadcast_leaderboard(&self) -> bool {
        let leaderboard = self.lock_tally().engine.ranked();
        self.adapter.send(&ClientFrame::LeaderboardUpdate { leaderboard })
    }

    // ── Views ───────────────────────────────────────────────────────

    /// Ranked standings with avatar URLs resolved.
    pub fn standings(&self) -> Vec<Standing> {
        let ranked = self.lock_tally().engine.ranked();
        ranked
            .into_iter()
            .map(|entry| {
                let avatar_url = self
                    .collaborators
                    .avatars
                    .avatar_url(entry.avatar_ref.as_deref().unwrap_or_default());
                Standing { entry, avatar_url }
            })
            .collect()
    }

    pub fn player_stats(&self, player_id: &str) -> Option<LeaderboardEntry> {
        self.lock_tally().engine.player_stats(player_id)
    }

    pub fn history(&self, player_id: &str) -> Vec<RoundResult> {
        self.lock_tally().engine.history(player_id).to_vec()
    }

    pub fn snapshot(&self) -> Arc<RoomState> {
        self.store.snapshot()
    }

    /// The store itself, for UI subscriptions.
    pub fn store(&self) -> &RoomStateStore {
        &self.store
    }

    pub fn readiness(&self) -> ReadinessStatus {
        self.readiness.status()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.adapter.state()
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Disconnect and stop every background task.
    pub async fn leave(&mut self) {
        info!(player = %self.self_id, "leaving room");
        self.subscriptions.clear();
        self.adapter.disconnect().await;
        self.readiness.shutdown().await;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn lock_tally(&self) -> std::sync::MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connector> std::fmt::Debug for RoomSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("self_id", &self.self_id)
            .field("connection", &self.adapter.state())
            .field("readiness", &self.readiness.status())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for RoomSession<C> {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Store observer that drives readiness and the leaderboard.
fn state_observer(
    readiness: ReadinessHandle,
    tally: Arc<Mutex<Tally>>,
    collaborators: Collaborators,
) -> impl Fn(&RoomState) + Send + Sync + 'static {
    move |state: &RoomState| {
        readiness.observe_roster(u32::try_from(state.players.len()).unwrap_or(u32::MAX));
        let absorbed = tally
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(state, &collaborators);
        let Some(absorbed) = absorbed else {
            return;
        };
        if absorbed.new_match {
            readiness.reset();
        }
        readiness.enter_round(absorbed.round);
        readiness.observe_submissions(absorbed.round, absorbed.submitted);
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
    use crate::protocol::PlayerState;
    use std::collections::HashMap;

    fn result(player: &str, score: f64) -> RoundResult {
        RoundResult {
            player_id: player.into(),
            distance_or_error: 5.0,
            score,
            submission_time_ms: 1_000.0,
            is_correct: true,
        }
    }

    fn state_with(round: u32, results: Vec<RoundResult>) -> RoomState {
        state_in(round, RoundPhase::Results, results)
    }

    fn state_in(round: u32, phase: RoundPhase, results: Vec<RoundResult>) -> RoomState {
        let mut info = RoundInfo::new(round);
        info.phase = phase;
        info.results = results;
        RoomState {
            players: vec![PlayerState::new("p1", "Ada"), PlayerState::new("p2", "")],
            round: Some(info),
            ..RoomState::default()
        }
    }

    #[test]
    fn repeated_snapshots_record_each_result_once() {
        let mut tally = Tally::default();
        let collaborators = Collaborators::default();

        let counted = |tally: &mut Tally, state: &RoomState| {
            tally
                .absorb(state, &collaborators)
                .map(|a| (a.round, a.submitted))
        };
        let state = state_with(1, vec![result("p1", 100.0)]);
        assert_eq!(counted(&mut tally, &state), Some((1, 1)));
        assert_eq!(counted(&mut tally, &state), Some((1, 1)));

        let state = state_with(1, vec![result("p1", 100.0), result("p2", 50.0)]);
        assert_eq!(counted(&mut tally, &state), Some((1, 2)));

        assert_eq!(tally.engine.history("p1").len(), 1);
        assert_eq!(tally.engine.history("p2").len(), 1);
    }

    #[test]
    fn names_fall_back_to_profiles_then_id() {
        let mut tally = Tally::default();
        let profiles: HashMap<String, String> =
            [("p2".to_string(), "Brook".to_string())].into();
        let collaborators = Collaborators::default().with_profiles(profiles);

        tally.absorb(
            &state_with(1, vec![result("p1", 1.0), result("p2", 1.0), result("p3", 1.0)]),
            &collaborators,
        );
        let name = |id: &str| tally.engine.player_stats(id).unwrap().display_name;
        assert_eq!(name("p1"), "Ada");
        assert_eq!(name("p2"), "Brook");
        assert_eq!(name("p3"), "p3");
    }

    #[test]
    fn rounds_restarting_begin_a_new_match() {
        let mut tally = Tally::default();
        let collaborators = Collaborators::default();

        tally.absorb(&state_with(1, vec![result("p1", 100.0)]), &collaborators);
        let second = tally.absorb(&state_with(2, vec![result("p1", 200.0)]), &collaborators);
        assert!(!second.unwrap().new_match);

        let replay = state_in(1, RoundPhase::Guessing, vec![result("p1", 999.0)]);
        let absorbed = tally.absorb(&replay, &collaborators).unwrap();
        assert!(absorbed.new_match);

        let history = tally.engine.history("p1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 999.0);
    }

    #[test]
    fn finished_match_back_to_guessing_is_a_new_match() {
        let mut tally = Tally::default();
        let collaborators = Collaborators::default();

        let last = state_in(1, RoundPhase::Finished, vec![result("p1", 100.0)]);
        tally.absorb(&last, &collaborators);
        let again = state_in(1, RoundPhase::Guessing, vec![result("p1", 300.0)]);
        assert!(tally.absorb(&again, &collaborators).unwrap().new_match);
        assert_eq!(tally.engine.player_stats("p1").unwrap().total_score, 300.0);

        // Later snapshots of the same round are not.
        assert!(!tally.absorb(&again, &collaborators).unwrap().new_match);
        assert_eq!(tally.engine.history("p1").len(), 1);
    }

    #[test]
    fn no_round_means_nothing_to_absorb() {
        let mut tally = Tally::default();
        let state = RoomState::default();
        assert_eq!(tally.absorb(&state, &Collaborators::default()), None);
    }
}
