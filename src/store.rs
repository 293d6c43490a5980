//! Canonical room state, reconciled from relay patches.
//!
//! The relay pushes `STATE` frames that are either full snapshots or partial
//! patches. Merging is shallow: each top-level field present in a patch
//! replaces the stored field wholesale, and absent fields are left alone. A
//! patch that changes one player's readiness therefore carries the whole
//! `players` collection.
//!
//! Collections may arrive as arrays or as keyed maps (`{"p1": {...}}`). Keyed
//! maps are normalized to ordered collections: entries carrying a numeric
//! `index` are ordered by it, the rest follow in the order they appeared.
//!
//! A patch is validated as a whole before anything is written, so a malformed
//! field drops the entire patch and leaves the state untouched.

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::listeners::{Listeners, Subscription};
use crate::protocol::{LeaderboardEntry, PlayerState, RoomPatch, RoundInfo};

const PLAYERS: &str = "players";
const LEADERBOARD: &str = "leaderboard";
const ROUND: &str = "round";

/// The merged view of a room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    pub players: Vec<PlayerState>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub round: Option<RoundInfo>,
    /// Top-level fields this client does not interpret, stored as received.
    pub extra: Map<String, Value>,
}

impl RoomState {
    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn host(&self) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn round_number(&self) -> Option<u32> {
        self.round.as_ref().map(|r| r.number)
    }
}

/// A validated patch, ready to be written.
#[derive(Default)]
struct Update {
    players: Option<Vec<PlayerState>>,
    leaderboard: Option<Vec<LeaderboardEntry>>,
    round: Option<Option<RoundInfo>>,
    extra: Vec<(String, Value)>,
}

impl Update {
    fn parse(patch: &RoomPatch) -> Result<Self, String> {
        let mut update = Self::default();
        for (key, value) in patch.fields() {
            match key.as_str() {
                PLAYERS => update.players = Some(normalize(value, PLAYERS, "id")?),
                LEADERBOARD => {
                    update.leaderboard = Some(normalize(value, LEADERBOARD, "playerId")?);
                }
                ROUND => {
                    update.round = Some(if value.is_null() {
                        None
                    } else {
                        Some(
                            serde_json::from_value(value.clone())
                                .map_err(|e| format!("round: {e}"))?,
                        )
                    });
                }
                _ => update.extra.push((key.clone(), value.clone())),
            }
        }
        Ok(update)
    }

    fn apply_to(self, state: &mut RoomState) {
        if let Some(players) = self.players {
            state.players = players;
        }
        if let Some(leaderboard) = self.leaderboard {
            state.leaderboard = leaderboard;
        }
        if let Some(round) = self.round {
            state.round = round;
        }
        for (key, value) in self.extra {
            state.extra.insert(key, value);
        }
    }
}

/// Decode an array or keyed map of `T` into an ordered `Vec<T>`.
///
/// Map entries missing `id_field` take their map key as the id.
fn normalize<T: DeserializeOwned>(
    value: &Value,
    field: &str,
    id_field: &str,
) -> Result<Vec<T>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item.clone()).map_err(|e| format!("{field}[{i}]: {e}"))
            })
            .collect(),
        Value::Object(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (position, (key, entry)) in entries.iter().enumerate() {
                let Value::Object(fields) = entry else {
                    return Err(format!("{field}.{key}: expected an object"));
                };
                let mut fields = fields.clone();
                let index = fields.get("index").and_then(Value::as_u64);
                if !fields.contains_key(id_field) {
                    fields.insert(id_field.to_owned(), Value::String(key.clone()));
                }
                let item: T = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| format!("{field}.{key}: {e}"))?;
                keyed.push((index.unwrap_or(u64::MAX), position, item));
            }
            keyed.sort_by_key(|(index, position, _)| (*index, *position));
            Ok(keyed.into_iter().map(|(_, _, item)| item).collect())
        }
        other => Err(format!("{field}: expected an array or keyed map, got {other}")),
    }
}

/// Single source of truth for room membership and round state.
///
/// Mutated only through [`apply_patch`](Self::apply_patch) and
/// [`remove_player`](Self::remove_player). Subscribers are called
/// synchronously after each successful change, outside the state lock.
#[derive(Debug, Default)]
pub struct RoomStateStore {
    state: RwLock<Arc<RoomState>>,
    listeners: Listeners<RoomState>,
}

impl RoomStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `patch` into the canonical state.
    ///
    /// Returns `false`, after logging a warning, if the patch was malformed
    /// and dropped. An empty patch is accepted and changes nothing.
    pub fn apply_patch(&self, patch: &RoomPatch) -> bool {
        if patch.is_empty() {
            return true;
        }
        let update = match Update::parse(patch) {
            Ok(update) => update,
            Err(reason) => {
                warn!(%reason, "dropping malformed room patch");
                return false;
            }
        };

        let snapshot = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = RoomState::clone(&guard);
            update.apply_to(&mut next);
            *guard = Arc::new(next);
            Arc::clone(&guard)
        };

        debug!(
            players = snapshot.players.len(),
            round = ?snapshot.round_number(),
            "room patch applied"
        );
        self.listeners.emit(&snapshot);
        true
    }

    /// Remove a player who left the room. Returns whether they were present.
    pub fn remove_player(&self, id: &str) -> bool {
        let snapshot = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if guard.player(id).is_none() {
                return false;
            }
            let mut next = RoomState::clone(&guard);
            next.players.retain(|p| p.id != id);
            *guard = Arc::new(next);
            Arc::clone(&guard)
        };

        debug!(player = %id, "player removed from roster");
        self.listeners.emit(&snapshot);
        true
    }

    /// Current state. Cheap: shares the stored snapshot.
    pub fn snapshot(&self) -> Arc<RoomState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Call `handler` with the new state after every successful change.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RoomState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
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
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn patch(value: Value) -> RoomPatch {
        serde_json::from_value(value).unwrap()
    }

    fn seeded() -> RoomStateStore {
        let store = RoomStateStore::new();
        assert!(store.apply_patch(&patch(json!({
            "players": [
                {"id": "p1", "displayName": "Ada", "isHost": true},
                {"id": "p2", "displayName": "Brook"}
            ],
            "leaderboard": [{"playerId": "p1", "totalScore": 5000.0, "rank": 1}],
            "round": {"number": 1}
        }))));
        store
    }

    #[test]
    fn round_only_patch_leaves_players_and_leaderboard() {
        let store = seeded();
        let before = store.snapshot();

        assert!(store.apply_patch(&patch(json!({"round": {"number": 2, "phase": "results"}}))));
        let after = store.snapshot();

        assert_eq!(after.players, before.players);
        assert_eq!(after.leaderboard, before.leaderboard);
        assert_eq!(after.round_number(), Some(2));
    }

    #[test]
    fn players_field_is_replaced_wholesale() {
        let store = seeded();
        store.apply_patch(&patch(json!({"players": [{"id": "p2", "isReady": true}]})));
        let state = store.snapshot();
        assert_eq!(state.players.len(), 1);
        assert!(state.player("p2").unwrap().is_ready);
        assert!(state.player("p1").is_none());
    }

    #[test]
    fn keyed_map_uses_index_then_discovery_order() {
        let store = RoomStateStore::new();
        store.apply_patch(&patch(json!({"players": {
            "zed": {"displayName": "Zed"},
            "amy": {"displayName": "Amy", "index": 1},
            "bob": {"displayName": "Bob", "index": 0},
            "cat": {"displayName": "Cat"}
        }})));
        let ids: Vec<_> = store.snapshot().players.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["bob", "amy", "zed", "cat"]);
    }

    #[test]
    fn keyed_leaderboard_takes_player_id_from_key() {
        let store = RoomStateStore::new();
        store.apply_patch(&patch(json!({"leaderboard": {"p9": {"totalScore": 10.0}}})));
        assert_eq!(store.snapshot().leaderboard[0].player_id, "p9");
    }

    #[test]
    fn malformed_patch_is_dropped_whole() {
        let store = seeded();
        let before = store.snapshot();
        let notified = Arc::new(AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        let _sub = store.subscribe(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!store.apply_patch(&patch(json!({
            "round": {"number": 9},
            "players": [{"displayName": "no id"}]
        }))));
        assert!(!store.apply_patch(&patch(json!({"players": 42}))));

        assert_eq!(*store.snapshot(), *before);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_fields_are_kept_in_extra() {
        let store = seeded();
        store.apply_patch(&patch(json!({"phase": "playing", "hintCost": 3})));
        let state = store.snapshot();
        assert_eq!(state.extra.get("phase"), Some(&json!("playing")));
        assert_eq!(state.extra.get("hintCost"), Some(&json!(3)));
    }

    #[test]
    fn null_round_clears_round() {
        let store = seeded();
        store.apply_patch(&patch(json!({"round": null})));
        assert!(store.snapshot().round.is_none());
    }

    #[test]
    fn subscribers_see_each_applied_patch() {
        let store = RoomStateStore::new();
        let rounds = Arc::new(std::sync::Mutex::new(Vec::new()));
        let r = Arc::clone(&rounds);
        let _sub = store.subscribe(move |state| r.lock().unwrap().push(state.round_number()));

        store.apply_patch(&patch(json!({"round": {"number": 1}})));
        store.apply_patch(&patch(json!({"round": {"number": 2}})));
        assert_eq!(*rounds.lock().unwrap(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn remove_player_notifies_only_when_present() {
        let store = seeded();
        let notified = Arc::new(AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        let _sub = store.subscribe(move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.remove_player("p2"));
        assert!(!store.remove_player("p2"));
        assert_eq!(store.snapshot().players.len(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }
}
