#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Readiness coordinator tests on a paused clock.
//!
//! With the default config a tick is one second, the countdown is 30 ticks
//! and the grace period 3 ticks.

mod common;

use std::time::Duration;

use room_sync_client::protocol::{ClientFrame, ResultsReadyPayload};
use room_sync_client::readiness::ReadinessPhase;
use room_sync_client::{Advance, AdvanceReason, ReadinessConfig, ReadinessCoordinator};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use common::{init_tracing, RecordingSink};

fn start(sink: &RecordingSink) -> (ReadinessCoordinator, mpsc::Receiver<Advance>) {
    init_tracing();
    ReadinessCoordinator::start(sink.clone(), ReadinessConfig::default())
}

fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

fn signal(round: u32) -> ClientFrame {
    ClientFrame::ResultsReady(ResultsReadyPayload::signal(round))
}

fn peer(round: u32, player: &str, ready: bool) -> ResultsReadyPayload {
    ResultsReadyPayload {
        player_id: Some(player.into()),
        ready,
        ..ResultsReadyPayload::signal(round)
    }
}

#[tokio::test(start_paused = true)]
async fn two_players_reach_quorum_before_countdown() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.observe_roster(2);
    coordinator.enter_round(1);
    coordinator.mark_ready();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(sink.frames(), vec![signal(1)]);
    let status = coordinator.status();
    assert_eq!(status.phase, ReadinessPhase::SignalSent);
    assert_eq!(status.expected_participants, 2);
    assert_eq!(status.countdown_remaining, 30);

    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 1, 2));
    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 2, 2));

    let advance = advances.recv().await.unwrap();
    assert_eq!(
        advance,
        Advance {
            round: 1,
            reason: AdvanceReason::Quorum
        }
    );
    assert!(began.elapsed() < Duration::from_secs(1));

    sleep(Duration::from_millis(10)).await;
    let status = coordinator.status();
    assert!(status.advanced);
    assert_eq!(status.phase, ReadinessPhase::Advanced);
    assert_eq!(status.server_ready_count, 2);
}

#[tokio::test(start_paused = true)]
async fn per_player_signals_reach_quorum_without_counts() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);

    coordinator.observe_roster(2);
    coordinator.enter_round(1);
    coordinator.mark_ready();
    coordinator.observe_results_ready(peer(1, "p1", true));
    coordinator.observe_results_ready(peer(1, "p1", true));
    sleep(Duration::from_millis(10)).await;

    assert!(advances.try_recv().is_err());
    assert_eq!(coordinator.status().server_ready_count, 1);

    coordinator.observe_results_ready(peer(1, "p2", true));
    assert_eq!(
        advances.recv().await.unwrap(),
        Advance {
            round: 1,
            reason: AdvanceReason::Quorum
        }
    );
}

#[tokio::test(start_paused = true)]
async fn reset_forgets_the_round_and_its_countdown() {
    let sink = RecordingSink::refusing();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.enter_round(1);
    sleep(Duration::from_secs(10)).await;
    coordinator.reset();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(coordinator.status().round_number, None);

    // The same round number counts as new after a reset.
    coordinator.enter_round(1);
    let advance = advances.recv().await.unwrap();
    assert_eq!(advance.round, 1);
    assert_elapsed(began, Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn dead_connection_falls_back_locally_when_countdown_expires() {
    let sink = RecordingSink::refusing();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.observe_roster(2);
    coordinator.enter_round(1);

    let advance = advances.recv().await.unwrap();
    assert_eq!(advance.reason, AdvanceReason::LocalFallback);
    assert_eq!(advance.round, 1);
    assert_elapsed(began, Duration::from_secs(30));

    // The forced signal was attempted once.
    assert_eq!(sink.frames(), vec![signal(1)]);
}

#[tokio::test(start_paused = true)]
async fn silent_relay_advances_after_grace_period() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.observe_roster(2);
    coordinator.enter_round(1);

    sleep(Duration::from_secs(31)).await;
    let status = coordinator.status();
    assert_eq!(status.phase, ReadinessPhase::SignalSent);
    assert!(status.grace_active);
    assert_eq!(status.countdown_remaining, 0);
    assert_eq!(sink.frames(), vec![signal(1)]);

    let advance = advances.recv().await.unwrap();
    assert_eq!(advance.reason, AdvanceReason::GracePeriod);
    assert_elapsed(began, Duration::from_secs(33));
}

#[tokio::test(start_paused = true)]
async fn a_round_advances_at_most_once() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);

    coordinator.observe_roster(1);
    coordinator.enter_round(1);
    coordinator.mark_ready();
    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 1, 1));
    assert_eq!(advances.recv().await.unwrap().reason, AdvanceReason::Quorum);

    // Duplicates, late readiness and the old countdown change nothing.
    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 1, 1));
    coordinator.mark_ready();
    sleep(Duration::from_secs(60)).await;

    assert!(advances.try_recv().is_err());
    assert_eq!(sink.frames(), vec![signal(1)]);
}

#[tokio::test(start_paused = true)]
async fn aggregates_for_other_rounds_are_ignored() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);

    coordinator.observe_roster(2);
    coordinator.enter_round(2);
    coordinator.mark_ready();
    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 5, 2));
    sleep(Duration::from_secs(5)).await;

    assert!(advances.try_recv().is_err());
    assert_eq!(coordinator.status().server_ready_count, 0);
    assert_eq!(coordinator.status().round_number, Some(2));
}

#[tokio::test(start_paused = true)]
async fn entering_a_new_round_restarts_the_countdown() {
    let sink = RecordingSink::refusing();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.enter_round(1);
    sleep(Duration::from_secs(10)).await;
    coordinator.enter_round(2);
    sleep(Duration::from_millis(10)).await;

    let status = coordinator.status();
    assert_eq!(status.round_number, Some(2));
    assert_eq!(status.countdown_remaining, 30);
    assert_eq!(status.phase, ReadinessPhase::Idle);

    let advance = advances.recv().await.unwrap();
    assert_eq!(advance.round, 2);
    assert_elapsed(began, Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn re_entering_the_current_round_changes_nothing() {
    let sink = RecordingSink::refusing();
    let (coordinator, mut advances) = start(&sink);
    let began = Instant::now();

    coordinator.enter_round(1);
    sleep(Duration::from_secs(10)).await;
    coordinator.enter_round(1);

    let advance = advances.recv().await.unwrap();
    assert_eq!(advance.round, 1);
    assert_elapsed(began, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn submissions_raise_the_expected_count() {
    let sink = RecordingSink::accepting();
    let (coordinator, mut advances) = start(&sink);

    coordinator.observe_roster(2);
    coordinator.enter_round(1);
    coordinator.observe_submissions(1, 3);
    coordinator.mark_ready();
    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 2, 2));
    sleep(Duration::from_millis(10)).await;

    // Three players submitted, only two are ready.
    assert!(advances.try_recv().is_err());
    assert_eq!(coordinator.status().expected_participants, 3);

    coordinator.observe_results_ready(ResultsReadyPayload::aggregate(1, 3, 3));
    assert_eq!(advances.recv().await.unwrap().reason, AdvanceReason::Quorum);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_countdown() {
    let sink = RecordingSink::refusing();
    let (mut coordinator, mut advances) = start(&sink);

    coordinator.enter_round(1);
    coordinator.shutdown().await;

    assert!(advances.recv().await.is_none());
    assert!(sink.frames().is_empty());
}
