#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for relay frames.
//!
//! Checks the exact JSON each outbound frame produces and decodes fixtures
//! shaped like real relay output.

use room_sync_client::protocol::{
    ClientFrame, LeaderboardEntry, PlayerState, ResultsReadyPayload, RoomPatch, RoundInfo,
    RoundPhase, RoundResult, ServerFrame,
};
use serde_json::{json, Value};

fn to_value(frame: &ClientFrame) -> Value {
    serde_json::to_value(frame).expect("serialize")
}

// ════════════════════════════════════════════════════════════════════
// Outbound frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_move_carries_round_and_opaque_guess() {
    let frame = ClientFrame::PlayerMove {
        round: 3,
        guess: json!({"lat": 51.5, "lng": -0.12}),
    };
    assert_eq!(
        to_value(&frame),
        json!({"type": "PLAYER_MOVE", "round": 3, "guess": {"lat": 51.5, "lng": -0.12}})
    );
}

#[test]
fn ready_toggle_uses_camel_case() {
    let frame = ClientFrame::PlayerReadyToggle { is_ready: false };
    assert_eq!(
        to_value(&frame),
        json!({"type": "PLAYER_READY_TOGGLE", "isReady": false})
    );
}

#[test]
fn start_game_is_a_bare_tag() {
    assert_eq!(to_value(&ClientFrame::StartGame), json!({"type": "START_GAME"}));
}

#[test]
fn readiness_signal_omits_aggregate_fields() {
    let frame = ClientFrame::ResultsReady(ResultsReadyPayload::signal(4));
    assert_eq!(
        to_value(&frame),
        json!({"type": "results-ready", "roundNumber": 4, "ready": true})
    );
}

#[test]
fn leaderboard_update_nests_entries() {
    let entry = LeaderboardEntry {
        player_id: "p1".into(),
        display_name: "Ada".into(),
        avatar_ref: None,
        total_score: 4200.0,
        accuracy: 1.0,
        rounds_won: 1,
        rounds_played: 1,
        average_distance: 12.0,
        fastest_submission: 8000.0,
        streak: 1,
        rank: 1,
    };
    let value = to_value(&ClientFrame::LeaderboardUpdate {
        leaderboard: vec![entry],
    });
    assert_eq!(value["type"], "LEADERBOARD_UPDATE");
    assert_eq!(value["leaderboard"][0]["playerId"], "p1");
    assert_eq!(value["leaderboard"][0]["totalScore"], 4200.0);
    assert_eq!(value["leaderboard"][0]["roundsWon"], 1);
    assert!(value["leaderboard"][0].get("avatarRef").is_none());
}

#[test]
fn kind_matches_wire_tag() {
    let frames = [
        ClientFrame::PlayerMove {
            round: 1,
            guess: Value::Null,
        },
        ClientFrame::PlayerReadyToggle { is_ready: true },
        ClientFrame::StartGame,
        ClientFrame::LeaderboardUpdate {
            leaderboard: vec![],
        },
        ClientFrame::ResultsReady(ResultsReadyPayload::signal(1)),
    ];
    for frame in frames {
        assert_eq!(to_value(&frame)["type"], frame.kind());
    }
}

// ════════════════════════════════════════════════════════════════════
// Inbound frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn state_frame_keeps_fields_in_wire_order() {
    let frame: ServerFrame = serde_json::from_str(
        r#"{"type":"STATE","round":{"number":2},"players":[],"hintCost":3}"#,
    )
    .unwrap();
    let ServerFrame::State(patch) = frame else {
        panic!("expected STATE, got {frame:?}");
    };
    let keys: Vec<_> = patch.fields().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["round", "players", "hintCost"]);
    assert!(patch.field("type").is_none());
}

#[test]
fn relay_aggregate_decodes_counts() {
    let frame: ServerFrame = serde_json::from_str(
        r#"{"type":"results-ready","roundNumber":2,"readyCount":3,"totalPlayers":4}"#,
    )
    .unwrap();
    assert_eq!(
        frame,
        ServerFrame::ResultsReady(ResultsReadyPayload::aggregate(2, 3, 4))
    );
}

#[test]
fn peer_signal_echo_decodes_without_counts() {
    let frame: ServerFrame = serde_json::from_str(
        r#"{"type":"results-ready","roundNumber":2,"ready":true,"playerId":"p3"}"#,
    )
    .unwrap();
    let ServerFrame::ResultsReady(payload) = frame else {
        panic!("expected results-ready");
    };
    assert_eq!(payload.ready_count, None);
    assert_eq!(payload.player_id.as_deref(), Some("p3"));
}

#[test]
fn player_left_decodes() {
    let frame: ServerFrame =
        serde_json::from_str(r#"{"type":"PLAYER_LEFT","playerId":"p2"}"#).unwrap();
    assert_eq!(
        frame,
        ServerFrame::PlayerLeft {
            player_id: "p2".into()
        }
    );
}

#[test]
fn unknown_or_untagged_frames_fail_closed() {
    for raw in [
        r#"{"type":"PLAYER_MOVE","round":1,"guess":null}"#,
        r#"{"type":"SOMETHING_ELSE"}"#,
        r#"{"round":{"number":1}}"#,
        r#"{"type":"results-ready"}"#,
        "[]",
    ] {
        assert!(
            serde_json::from_str::<ServerFrame>(raw).is_err(),
            "{raw} should not decode"
        );
    }
}

// ════════════════════════════════════════════════════════════════════
// Room data
// ════════════════════════════════════════════════════════════════════

#[test]
fn player_state_defaults_missing_flags() {
    let player: PlayerState = serde_json::from_value(json!({"id": "p1"})).unwrap();
    assert_eq!(player, PlayerState::new("p1", ""));
}

#[test]
fn round_info_tolerates_unknown_phase() {
    let round: RoundInfo =
        serde_json::from_value(json!({"number": 5, "phase": "intermission"})).unwrap();
    assert_eq!(round.phase, RoundPhase::Other);
    assert!(round.results.is_empty());
}

#[test]
fn round_result_fixture_decodes() {
    let result: RoundResult = serde_json::from_value(json!({
        "playerId": "p1",
        "distanceOrError": 12.5,
        "score": 4100.0,
        "submissionTimeMs": 7350.0,
        "isCorrect": true
    }))
    .unwrap();
    assert_eq!(result.player_id, "p1");
    assert!(result.is_correct);
}

#[test]
fn room_patch_builder_matches_decoded_patch() {
    let built = RoomPatch::new().with_field("round", json!({"number": 1}));
    let decoded: RoomPatch = serde_json::from_str(r#"{"round":{"number":1}}"#).unwrap();
    assert_eq!(built, decoded);
    assert!(RoomPatch::new().is_empty());
}
