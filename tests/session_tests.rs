#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end session tests: relay frames in, standings and advances out.

mod common;

use std::time::Duration;

use room_sync_client::collaborators::AvatarUrlPrefix;
use room_sync_client::protocol::ClientFrame;
use room_sync_client::{
    Advance, AdvanceReason, Collaborators, ConnectionConfig, ConnectionError, ConnectionStatus,
    RoomSession, RoomSyncError, SessionConfig, SessionEvent,
};
use serde_json::json;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

use common::{
    credential_for, init_tracing, peer_ready_json, player_left_json, results_ready_json,
    sent_frames, state_json, Feed, MockConnector, MockTransport,
};

type Sent = std::sync::Arc<std::sync::Mutex<Vec<String>>>;

async fn join_as(player: &str) -> (RoomSession<MockConnector>, Feed, Sent) {
    let (transport, feed, sent, _closed) = MockTransport::live();
    let connection = ConnectionConfig::default()
        .with_jitter(Duration::ZERO)
        .with_max_attempts(1);
    let session = join_with(player, vec![transport], connection).await;
    (session, feed, sent)
}

async fn join_with(
    player: &str,
    transports: Vec<MockTransport>,
    connection: ConnectionConfig,
) -> RoomSession<MockConnector> {
    init_tracing();
    let (connector, _calls) = MockConnector::new(transports.into_iter().map(Ok).collect());
    let config = SessionConfig::default().with_connection(connection);
    let collaborators = Collaborators::default()
        .with_avatars(AvatarUrlPrefix::new("https://cdn.test/a", "https://cdn.test/none.png"));

    assert_ok!(
        RoomSession::join(connector, "ROOM42", credential_for(player), config, collaborators)
            .await
    )
}

fn lobby() -> serde_json::Value {
    json!({
        "players": [
            {"id": "p1", "displayName": "Ada", "isHost": true, "avatarRef": "fox"},
            {"id": "p2", "displayName": "Brook"}
        ],
        "round": {"number": 1, "phase": "guessing"}
    })
}

async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn full_round_from_lobby_to_standings() {
    let (mut session, feed, sent) = join_as("p1").await;
    assert_eq!(session.self_id(), "p1");

    feed.frame(state_json(lobby()));
    settle().await;
    assert_eq!(session.snapshot().players.len(), 2);
    assert_eq!(session.readiness().round_number, Some(1));
    assert_eq!(session.readiness().expected_participants, 2);

    assert_ok!(session.start_game());
    assert!(session.submit_guess(1, json!({"lat": 10.0, "lng": 20.0})));

    feed.frame(state_json(json!({
        "round": {
            "number": 1,
            "phase": "results",
            "results": [
                {"playerId": "p1", "distanceOrError": 12.0, "score": 4200.0, "submissionTimeMs": 8000.0, "isCorrect": true},
                {"playerId": "p2", "distanceOrError": 900.0, "score": 1200.0, "submissionTimeMs": 6000.0, "isCorrect": false}
            ]
        }
    })));
    settle().await;
    session.finish_round();
    settle().await;
    feed.frame(results_ready_json(1, 2, 2));

    let event = session.next_event().await.unwrap();
    assert_eq!(
        event,
        SessionEvent::RoundAdvanced(Advance {
            round: 1,
            reason: AdvanceReason::Quorum
        })
    );

    let standings = session.standings();
    let rows: Vec<_> = standings
        .iter()
        .map(|s| (s.entry.rank, s.entry.display_name.as_str(), s.avatar_url.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            (1, "Ada", "https://cdn.test/a/fox"),
            (2, "Brook", "https://cdn.test/none.png"),
        ]
    );
    assert_eq!(session.player_stats("p1").unwrap().streak, 1);
    assert_eq!(session.history("p2").len(), 1);

    assert!(session.broadcast_leaderboard());
    settle().await;

    let kinds: Vec<_> = sent_frames(&sent).iter().map(|f| f.kind()).collect();
    assert_eq!(
        kinds,
        vec!["START_GAME", "PLAYER_MOVE", "results-ready", "LEADERBOARD_UPDATE"]
    );

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn peer_signals_without_counts_advance_on_quorum() {
    let (mut session, feed, _sent) = join_as("p1").await;
    feed.frame(state_json(lobby()));
    settle().await;

    session.finish_round();
    feed.frame(peer_ready_json(1, "p1", true));
    feed.frame(peer_ready_json(1, "p2", true));

    let event = session.next_event().await.unwrap();
    assert_eq!(
        event,
        SessionEvent::RoundAdvanced(Advance {
            round: 1,
            reason: AdvanceReason::Quorum
        })
    );
    assert_eq!(session.readiness().server_ready_count, 2);

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn restarted_rounds_start_a_new_match() {
    let (mut session, feed, _sent) = join_as("p1").await;
    feed.frame(state_json(lobby()));
    let result = |score: f64| {
        json!({"playerId": "p1", "distanceOrError": 3.0, "score": score, "submissionTimeMs": 2.0, "isCorrect": true})
    };
    feed.frame(state_json(json!({"round": {"number": 1, "results": [result(100.0)]}})));
    feed.frame(state_json(json!({"round": {"number": 2, "results": [result(200.0)]}})));
    settle().await;
    assert_eq!(session.history("p1").len(), 2);

    feed.frame(state_json(json!({
        "round": {"number": 1, "phase": "guessing", "results": [result(999.0)]}
    })));
    settle().await;

    let history = session.history("p1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].score, 999.0);
    assert_eq!(session.player_stats("p1").unwrap().total_score, 999.0);

    let readiness = session.readiness();
    assert_eq!(readiness.round_number, Some(1));
    assert!(!readiness.advanced);
    assert_eq!(readiness.countdown_remaining, 30);

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_after_reconnect_replaces_room_state() {
    let (first, first_feed, _, _) = MockTransport::live();
    let (second, second_feed, _, _) = MockTransport::live();
    let connection = ConnectionConfig::default()
        .with_backoff(Duration::from_millis(100), Duration::from_secs(1))
        .with_jitter(Duration::ZERO)
        .with_max_attempts(3);
    let mut session = join_with("p1", vec![first, second], connection).await;

    first_feed.frame(state_json(lobby()));
    settle().await;
    assert_eq!(session.readiness().round_number, Some(1));

    first_feed.close();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(
        session.connection_state().status,
        ConnectionStatus::Connected
    );

    second_feed.frame(state_json(json!({
        "players": [
            {"id": "p1", "displayName": "Ada", "isHost": true},
            {"id": "p3", "displayName": "Cy"},
            {"id": "p4", "displayName": "Dee"}
        ],
        "round": {"number": 2, "phase": "guessing"}
    })));
    settle().await;

    let state = session.snapshot();
    let ids: Vec<_> = state.players.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p3", "p4"]);
    assert_eq!(state.round_number(), Some(2));

    let readiness = session.readiness();
    assert_eq!(readiness.round_number, Some(2));
    assert_eq!(readiness.expected_participants, 3);
    assert_eq!(readiness.countdown_remaining, 30);

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_state_does_not_double_count_results() {
    let (mut session, feed, _sent) = join_as("p1").await;
    feed.frame(state_json(lobby()));
    let results = json!({
        "round": {"number": 1, "results": [
            {"playerId": "p2", "distanceOrError": 1.0, "score": 500.0, "submissionTimeMs": 1.0, "isCorrect": true}
        ]}
    });
    feed.frame(state_json(results.clone()));
    feed.frame(state_json(results));
    settle().await;

    let stats = session.player_stats("p2").unwrap();
    assert_eq!(stats.rounds_played, 1);
    assert_eq!(stats.display_name, "Brook");

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn only_the_host_may_start() {
    let (mut session, feed, sent) = join_as("p2").await;
    feed.frame(state_json(lobby()));
    settle().await;

    let err = assert_err!(session.start_game());
    assert!(matches!(err, RoomSyncError::NotHost), "got {err:?}");
    assert!(sent_frames(&sent)
        .iter()
        .all(|f| !matches!(f, ClientFrame::StartGame)));

    assert!(session.toggle_ready(true));
    settle().await;
    assert_eq!(
        sent_frames(&sent),
        vec![ClientFrame::PlayerReadyToggle { is_ready: true }]
    );

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn departed_players_leave_the_roster() {
    let (mut session, feed, _sent) = join_as("p1").await;
    feed.frame(state_json(lobby()));
    feed.frame(player_left_json("p2"));
    settle().await;

    let state = session.snapshot();
    assert_eq!(state.players.len(), 1);
    assert!(state.player("p2").is_none());
    assert_eq!(session.readiness().expected_participants, 1);

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn lost_connection_surfaces_as_an_event() {
    let (mut session, feed, _sent) = join_as("p1").await;
    feed.close();

    let event = session.next_event().await.unwrap();
    let SessionEvent::ConnectionFailed(ConnectionError::AttemptsExhausted { attempts, .. }) =
        event
    else {
        panic!("expected ConnectionFailed, got {event:?}");
    };
    assert_eq!(attempts, 1);
    assert_eq!(
        session.connection_state().status,
        ConnectionStatus::PermanentlyFailed
    );
    assert!(!session.submit_guess(1, json!(null)));

    session.leave().await;
}

#[tokio::test(start_paused = true)]
async fn bad_credential_is_rejected_by_join() {
    let (connector, calls) = MockConnector::new(vec![]);
    let result = RoomSession::join(
        connector,
        "ROOM42",
        "abc.def",
        SessionConfig::default(),
        Collaborators::default(),
    )
    .await;

    let err = assert_err!(result);
    assert!(matches!(err, RoomSyncError::InvalidCredential(_)), "got {err:?}");
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_ends_the_event_stream() {
    let (mut session, _feed, _sent) = join_as("p1").await;
    session.leave().await;

    assert!(session.next_event().await.is_none());
    assert_eq!(
        session.connection_state().status,
        ConnectionStatus::Disconnected
    );
}
