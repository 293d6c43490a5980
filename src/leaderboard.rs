//! Standings derived from per-player round histories.
//!
//! Each player has an append-only history of [`RoundResult`]s. Aggregates are
//! recomputed from that history whenever it grows, and [`ranked`](LeaderboardEngine::ranked)
//! sorts a fresh copy on every call, so the same sequence of results always
//! yields the same standings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::protocol::{LeaderboardEntry, PlayerId, RoundResult};

#[derive(Debug, Clone)]
struct PlayerRecord {
    history: Vec<RoundResult>,
    entry: LeaderboardEntry,
}

/// Folds round results into ranked, streak-aware standings.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardEngine {
    players: BTreeMap<PlayerId, PlayerRecord>,
}

impl LeaderboardEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `result` to the player's history and refresh their aggregates.
    ///
    /// `display_name` and `avatar_ref` overwrite whatever was recorded before,
    /// so renames show up on the next ranking.
    pub fn record_result(
        &mut self,
        player_id: &str,
        display_name: &str,
        avatar_ref: Option<&str>,
        result: RoundResult,
    ) {
        let record = self
            .players
            .entry(player_id.to_owned())
            .or_insert_with(|| PlayerRecord {
                history: Vec::new(),
                entry: empty_entry(player_id),
            });
        record.history.push(result);
        record.entry = aggregate(
            player_id,
            display_name,
            avatar_ref,
            &record.history,
        );
    }

    /// Every player, best first, with `rank` filled in.
    pub fn ranked(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> =
            self.players.values().map(|r| r.entry.clone()).collect();
        entries.sort_by(compare_standing);
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = u32::try_from(position + 1).unwrap_or(u32::MAX);
        }
        entries
    }

    /// One player's standing, ranked against everyone else.
    pub fn player_stats(&self, player_id: &str) -> Option<LeaderboardEntry> {
        if !self.players.contains_key(player_id) {
            return None;
        }
        self.ranked().into_iter().find(|e| e.player_id == player_id)
    }

    /// Results recorded for a player, oldest first.
    pub fn history(&self, player_id: &str) -> &[RoundResult] {
        self.players
            .get(player_id)
            .map(|r| r.history.as_slice())
            .unwrap_or_default()
    }

    /// Forget every player, e.g. when a new match starts.
    pub fn reset(&mut self) {
        self.players.clear();
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

fn empty_entry(player_id: &str) -> LeaderboardEntry {
    LeaderboardEntry {
        player_id: player_id.to_owned(),
        display_name: String::new(),
        avatar_ref: None,
        total_score: 0.0,
        accuracy: 0.0,
        rounds_won: 0,
        rounds_played: 0,
        average_distance: 0.0,
        fastest_submission: 0.0,
        streak: 0,
        rank: 0,
    }
}

fn aggregate(
    player_id: &str,
    display_name: &str,
    avatar_ref: Option<&str>,
    history: &[RoundResult],
) -> LeaderboardEntry {
    let played = history.len();
    let won = history.iter().filter(|r| r.is_correct).count();
    let total_score = history.iter().map(|r| r.score).sum();
    let (accuracy, average_distance) = if played == 0 {
        (0.0, 0.0)
    } else {
        let total_distance: f64 = history.iter().map(|r| r.distance_or_error).sum();
        (won as f64 / played as f64, total_distance / played as f64)
    };
    let fastest_submission = history
        .iter()
        .map(|r| r.submission_time_ms)
        .reduce(f64::min)
        .unwrap_or(0.0);
    let streak = history.iter().rev().take_while(|r| r.is_correct).count();

    LeaderboardEntry {
        player_id: player_id.to_owned(),
        display_name: display_name.to_owned(),
        avatar_ref: avatar_ref.map(str::to_owned),
        total_score,
        accuracy,
        rounds_won: count_u32(won),
        rounds_played: count_u32(played),
        average_distance,
        fastest_submission,
        streak: count_u32(streak),
        rank: 0,
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Score descending, then rounds won descending, then name, then id.
fn compare_standing(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| b.rounds_won.cmp(&a.rounds_won))
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn result(player: &str, score: f64, correct: bool) -> RoundResult {
        RoundResult {
            player_id: player.into(),
            distance_or_error: if correct { 0.0 } else { 120.0 },
            score,
            submission_time_ms: 4_000.0,
            is_correct: correct,
        }
    }

    fn engine_with(player: &str, outcomes: &[bool]) -> LeaderboardEngine {
        let mut engine = LeaderboardEngine::new();
        for &correct in outcomes {
            engine.record_result(player, player, None, result(player, 100.0, correct));
        }
        engine
    }

    #[test]
    fn streak_counts_back_from_latest_result() {
        let streak = |outcomes: &[bool]| {
            engine_with("p", outcomes)
                .player_stats("p")
                .map_or(0, |e| e.streak)
        };
        assert_eq!(streak(&[true, true, false, true]), 1);
        assert_eq!(streak(&[true, true, true]), 3);
        assert_eq!(streak(&[true, false]), 0);
        assert_eq!(streak(&[]), 0);
    }

    #[test]
    fn aggregates_follow_history() {
        let mut engine = LeaderboardEngine::new();
        engine.record_result(
            "p1",
            "Ada",
            Some("av-1"),
            RoundResult {
                player_id: "p1".into(),
                distance_or_error: 10.0,
                score: 4_000.0,
                submission_time_ms: 9_000.0,
                is_correct: true,
            },
        );
        engine.record_result(
            "p1",
            "Ada",
            Some("av-1"),
            RoundResult {
                player_id: "p1".into(),
                distance_or_error: 30.0,
                score: 1_000.0,
                submission_time_ms: 3_500.0,
                is_correct: false,
            },
        );

        let stats = engine.player_stats("p1").unwrap();
        assert_eq!(stats.rounds_played, 2);
        assert_eq!(stats.rounds_won, 1);
        assert_eq!(stats.total_score, 5_000.0);
        assert_eq!(stats.accuracy, 0.5);
        assert_eq!(stats.average_distance, 20.0);
        assert_eq!(stats.fastest_submission, 3_500.0);
        assert_eq!(stats.streak, 0);
        assert_eq!(stats.rank, 1);
        assert_eq!(stats.avatar_ref.as_deref(), Some("av-1"));
        assert_eq!(engine.history("p1").len(), 2);
    }

    #[test]
    fn unknown_player_has_no_stats_and_empty_history() {
        let engine = LeaderboardEngine::new();
        assert!(engine.player_stats("ghost").is_none());
        assert!(engine.history("ghost").is_empty());
        assert!(engine.ranked().is_empty());
    }

    #[test]
    fn ranking_breaks_ties_by_wins_then_name() {
        let mut engine = LeaderboardEngine::new();
        // Same total score; Cy has more correct rounds.
        engine.record_result("c", "Cy", None, result("c", 50.0, true));
        engine.record_result("c", "Cy", None, result("c", 50.0, true));
        engine.record_result("b", "Bo", None, result("b", 100.0, false));
        engine.record_result("a", "Al", None, result("a", 100.0, false));
        engine.record_result("z", "Zed", None, result("z", 300.0, false));

        let order: Vec<_> = engine
            .ranked()
            .into_iter()
            .map(|e| (e.display_name, e.rank))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Zed".to_string(), 1),
                ("Cy".to_string(), 2),
                ("Al".to_string(), 3),
                ("Bo".to_string(), 4),
            ]
        );
    }

    #[test]
    fn reset_forgets_everyone() {
        let mut engine = engine_with("p", &[true]);
        assert_eq!(engine.len(), 1);
        engine.reset();
        assert!(engine.is_empty());
    }
}
