//! Per-round readiness and quorum protocol.
//!
//! Every client decides on its own when a round is over. It signals readiness
//! to the relay, counts the readiness the relay reports back (an aggregate
//! count, or one signal per peer), and advances once the count covers
//! everyone it expects. Two timers keep the round live when the
//! relay or peers go quiet:
//!
//! - the **countdown** forces local readiness when it reaches zero;
//! - the **grace period**, armed at countdown expiry after a successful
//!   signal, forces advancement if no quorum shows up in time.
//!
//! If the readiness signal cannot be sent at all, the round falls back to
//! local readiness and advances at once, since no quorum can be observed
//! through a dead connection.
//!
//! The grace fallback trades agreement for liveness: a client may advance
//! while a slow peer is still on the previous round.
//!
//! [`RoundReadiness`] is the synchronous per-round state machine. Every path
//! to advancement goes through [`RoundReadiness::trigger_advance`], which
//! succeeds at most once per round. [`ReadinessCoordinator`] runs the machine
//! on a background task together with its timers.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::connection::FrameSink;
use crate::protocol::{ClientFrame, PlayerId, ResultsReadyPayload};
use crate::timer::Deadline;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Types ───────────────────────────────────────────────────────────

/// Where the local client is in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessPhase {
    #[default]
    Idle,
    /// Readiness decided; the signal is being sent.
    LocallyReady,
    /// The relay accepted the signal; waiting for quorum.
    SignalSent,
    /// The signal could not be sent; readiness is local only.
    LocalFallback,
    Advanced,
}

/// Which trigger ended the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    Quorum,
    LocalFallback,
    GracePeriod,
}

/// Emitted exactly once per round when it is safe to move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub round: u32,
    pub reason: AdvanceReason,
}

/// What countdown expiry led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Advanced(Advance),
    /// Signal is out but no quorum yet; the grace period should start.
    StartGrace,
    Nothing,
}

// ── State machine ───────────────────────────────────────────────────

/// Readiness state for a single round number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReadiness {
    round_number: u32,
    phase: ReadinessPhase,
    self_signaled: bool,
    server_ready_count: u32,
    /// Last `readyCount` the relay reported.
    aggregate_ready: u32,
    /// Peers whose per-player signal said they are ready.
    ready_peers: HashSet<PlayerId>,
    /// Ready signals that named no player.
    anonymous_ready: u32,
    server_participants: u32,
    roster_size: u32,
    submitted_count: u32,
    expected_participants: u32,
    local_fallback_ready: bool,
    advance_triggered: bool,
}

impl RoundReadiness {
    /// A fresh `Idle` round, seeded with the current roster size.
    pub fn new(round_number: u32, roster_size: u32) -> Self {
        let mut round = Self {
            round_number,
            phase: ReadinessPhase::Idle,
            self_signaled: false,
            server_ready_count: 0,
            aggregate_ready: 0,
            ready_peers: HashSet::new(),
            anonymous_ready: 0,
            server_participants: 0,
            roster_size,
            submitted_count: 0,
            expected_participants: 0,
            local_fallback_ready: false,
            advance_triggered: false,
        };
        round.refresh_expected();
        round
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn phase(&self) -> ReadinessPhase {
        self.phase
    }

    pub fn self_signaled(&self) -> bool {
        self.self_signaled
    }

    pub fn server_ready_count(&self) -> u32 {
        self.server_ready_count
    }

    pub fn expected_participants(&self) -> u32 {
        self.expected_participants
    }

    pub fn local_fallback_ready(&self) -> bool {
        self.local_fallback_ready
    }

    pub fn advance_triggered(&self) -> bool {
        self.advance_triggered
    }

    /// Declare local readiness, sending the signal through `send`.
    ///
    /// Only acts from `Idle`. A failed send moves to `LocalFallback` and
    /// advances immediately.
    pub fn mark_local_ready<F>(&mut self, send: F) -> Option<Advance>
    where
        F: FnOnce(&ClientFrame) -> bool,
    {
        if self.advance_triggered || self.phase != ReadinessPhase::Idle {
            return None;
        }
        self.phase = ReadinessPhase::LocallyReady;

        let frame = ClientFrame::ResultsReady(ResultsReadyPayload::signal(self.round_number));
        if send(&frame) {
            self.phase = ReadinessPhase::SignalSent;
            self.self_signaled = true;
            debug!(round = self.round_number, "readiness signal sent");
            self.evaluate()
        } else {
            self.phase = ReadinessPhase::LocalFallback;
            self.local_fallback_ready = true;
            self.refresh_expected();
            warn!(
                round = self.round_number,
                "readiness signal not sent, falling back to local readiness"
            );
            self.trigger_advance(AdvanceReason::LocalFallback)
        }
    }

    /// Fold in a relay `results-ready` frame. Other rounds are ignored.
    ///
    /// A frame carrying `readyCount` is an aggregate and replaces the last
    /// one. Otherwise it is a single signal: with a `playerId` it adds or
    /// withdraws that peer, without one it counts on its own. The ready count
    /// is the larger of the aggregate and the signals seen.
    pub fn observe_server(&mut self, payload: &ResultsReadyPayload) -> Option<Advance> {
        if payload.round_number != self.round_number {
            debug!(
                round = self.round_number,
                stale = payload.round_number,
                "ignoring readiness for another round"
            );
            return None;
        }
        match (payload.ready_count, payload.player_id.as_ref()) {
            (Some(count), _) => self.aggregate_ready = count,
            (None, Some(player)) if payload.ready => {
                self.ready_peers.insert(player.clone());
            }
            (None, Some(player)) => {
                self.ready_peers.remove(player);
            }
            (None, None) if payload.ready => {
                self.anonymous_ready = self.anonymous_ready.saturating_add(1);
            }
            (None, None) => self.anonymous_ready = self.anonymous_ready.saturating_sub(1),
        }
        let signaled = u32::try_from(self.ready_peers.len())
            .unwrap_or(u32::MAX)
            .saturating_add(self.anonymous_ready);
        self.server_ready_count = self.aggregate_ready.max(signaled);
        if let Some(total) = payload.total_players {
            self.server_participants = total;
        }
        self.evaluate()
    }

    pub fn observe_roster(&mut self, roster_size: u32) -> Option<Advance> {
        self.roster_size = roster_size;
        self.evaluate()
    }

    /// Distinct players with a submitted result this round.
    pub fn observe_submissions(&mut self, submitted: u32) -> Option<Advance> {
        self.submitted_count = submitted;
        self.evaluate()
    }

    /// `expected > 0` and every expected participant is accounted for.
    pub fn quorum_reached(&self) -> bool {
        let local = u32::from(self.local_fallback_ready);
        self.expected_participants > 0
            && self.server_ready_count.saturating_add(local) >= self.expected_participants
    }

    /// Countdown hit zero: force readiness, or ask for the grace period.
    pub fn countdown_expired<F>(&mut self, send: F) -> CountdownOutcome
    where
        F: FnOnce(&ClientFrame) -> bool,
    {
        if self.advance_triggered {
            return CountdownOutcome::Nothing;
        }
        if self.phase == ReadinessPhase::Idle {
            if let Some(advance) = self.mark_local_ready(send) {
                return CountdownOutcome::Advanced(advance);
            }
        }
        if self.phase == ReadinessPhase::SignalSent {
            CountdownOutcome::StartGrace
        } else {
            CountdownOutcome::Nothing
        }
    }

    /// The single gate to advancement. Returns `Some` only the first time.
    pub fn trigger_advance(&mut self, reason: AdvanceReason) -> Option<Advance> {
        if self.advance_triggered {
            return None;
        }
        self.advance_triggered = true;
        self.phase = ReadinessPhase::Advanced;
        Some(Advance {
            round: self.round_number,
            reason,
        })
    }

    fn refresh_expected(&mut self) {
        // No single source is authoritative early in a round, so take the
        // largest of what we know.
        let mut expected = self
            .roster_size
            .max(self.submitted_count)
            .max(self.server_participants);
        if self.local_fallback_ready {
            expected = expected.max(1);
        }
        self.expected_participants = expected;
    }

    fn evaluate(&mut self) -> Option<Advance> {
        self.refresh_expected();
        if self.quorum_reached() {
            self.trigger_advance(AdvanceReason::Quorum)
        } else {
            None
        }
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// What the UI needs to render readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadinessStatus {
    /// `None` before the first round is entered.
    pub round_number: Option<u32>,
    pub phase: ReadinessPhase,
    /// Whole ticks left on the countdown.
    pub countdown_remaining: u32,
    pub grace_active: bool,
    pub server_ready_count: u32,
    pub expected_participants: u32,
    pub advanced: bool,
}

// ── Coordinator ─────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    EnterRound(u32),
    Reset,
    MarkReady,
    ResultsReady(ResultsReadyPayload),
    Roster(u32),
    Submissions { round: u32, count: u32 },
}

/// Cheap, clonable command handle onto a [`ReadinessCoordinator`].
///
/// All methods are non-blocking and safe to call from subscription callbacks;
/// commands are applied in the order they were issued. Once the coordinator
/// has shut down, commands are ignored.
#[derive(Debug, Clone)]
pub struct ReadinessHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ReadinessStatus>,
}

impl ReadinessHandle {
    /// Reset for round `round` and start its countdown.
    ///
    /// Entering the round already in progress does nothing.
    pub fn enter_round(&self, round: u32) {
        self.command(Command::EnterRound(round));
    }

    /// Forget the current round and stop its timers, e.g. when a new match
    /// starts and round numbers begin again.
    pub fn reset(&self) {
        self.command(Command::Reset);
    }

    /// This client has finished the current round.
    pub fn mark_ready(&self) {
        self.command(Command::MarkReady);
    }

    /// A `results-ready` frame from the relay.
    pub fn observe_results_ready(&self, payload: ResultsReadyPayload) {
        self.command(Command::ResultsReady(payload));
    }

    /// Current roster size.
    pub fn observe_roster(&self, roster_size: u32) {
        self.command(Command::Roster(roster_size));
    }

    /// Players with a submitted result for `round`.
    pub fn observe_submissions(&self, round: u32, count: u32) {
        self.command(Command::Submissions { round, count });
    }

    pub fn status(&self) -> ReadinessStatus {
        *self.status_rx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ReadinessStatus> {
        self.status_rx.clone()
    }

    fn command(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            debug!("readiness loop has stopped, ignoring command");
        }
    }
}

/// Runs [`RoundReadiness`] and its timers on a background task.
///
/// Dereferences to a [`ReadinessHandle`] for issuing commands.
pub struct ReadinessCoordinator {
    handle: ReadinessHandle,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ReadinessCoordinator {
    /// Spawn the coordinator. Readiness signals go out through `sink`;
    /// advancements arrive on the returned receiver.
    #[must_use = "the advance receiver must be used to learn when rounds end"]
    pub fn start<S: FrameSink>(
        sink: S,
        config: ReadinessConfig,
    ) -> (Self, mpsc::Receiver<Advance>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (advance_tx, advance_rx) = mpsc::channel(config.advance_channel_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(ReadinessStatus::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            sink,
            config,
            round: None,
            roster_size: 0,
            countdown: Deadline::idle(),
            grace: Deadline::idle(),
            countdown_remaining: 0,
            status_tx,
        };
        let task = tokio::spawn(readiness_loop(driver, cmd_rx, advance_tx, shutdown_rx));

        let coordinator = Self {
            handle: ReadinessHandle { cmd_tx, status_rx },
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        (coordinator, advance_rx)
    }

    pub fn handle(&self) -> ReadinessHandle {
        self.handle.clone()
    }

    /// Stop the background task and cancel its timers.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("readiness loop did not exit within timeout; aborting task");
                task.abort();
            }
        }
    }
}

impl std::ops::Deref for ReadinessCoordinator {
    type Target = ReadinessHandle;

    fn deref(&self) -> &ReadinessHandle {
        &self.handle
    }
}

impl std::fmt::Debug for ReadinessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCoordinator")
            .field("status", &self.handle.status())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ReadinessCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// State owned by the coordinator task.
struct Driver<S> {
    sink: S,
    config: ReadinessConfig,
    round: Option<RoundReadiness>,
    roster_size: u32,
    countdown: Deadline,
    grace: Deadline,
    countdown_remaining: u32,
    status_tx: watch::Sender<ReadinessStatus>,
}

impl<S: FrameSink> Driver<S> {
    fn on_command(&mut self, command: Command) -> Option<Advance> {
        match command {
            Command::EnterRound(number) => {
                self.enter_round(number);
                None
            }
            Command::Reset => {
                self.reset();
                None
            }
            Command::MarkReady => {
                let sink = &self.sink;
                self.round
                    .as_mut()?
                    .mark_local_ready(|frame| sink.send(frame))
            }
            Command::ResultsReady(payload) => self.round.as_mut()?.observe_server(&payload),
            Command::Roster(size) => {
                self.roster_size = size;
                self.round.as_mut()?.observe_roster(size)
            }
            Command::Submissions { round, count } => {
                let current = self.round.as_mut()?;
                if current.round_number() != round {
                    return None;
                }
                current.observe_submissions(count)
            }
        }
    }

    fn enter_round(&mut self, number: u32) {
        if self.round.as_ref().map(RoundReadiness::round_number) == Some(number) {
            return;
        }
        self.countdown.cancel();
        self.grace.cancel();
        self.round = Some(RoundReadiness::new(number, self.roster_size));
        self.countdown_remaining = self.config.countdown_ticks;
        if self.countdown_remaining > 0 {
            self.countdown.arm(self.config.tick);
        }
        info!(
            round = number,
            countdown = self.countdown_remaining,
            "entered round"
        );
    }

    fn reset(&mut self) {
        self.countdown.cancel();
        self.grace.cancel();
        self.countdown_remaining = 0;
        if let Some(round) = self.round.take() {
            info!(round = round.round_number(), "readiness reset");
        }
    }

    fn on_tick(&mut self) -> Option<Advance> {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            self.countdown.arm(self.config.tick);
            return None;
        }
        self.on_countdown_expired()
    }

    fn on_countdown_expired(&mut self) -> Option<Advance> {
        let sink = &self.sink;
        let round = self.round.as_mut()?;
        debug!(round = round.round_number(), "countdown expired");
        match round.countdown_expired(|frame| sink.send(frame)) {
            CountdownOutcome::Advanced(advance) => Some(advance),
            CountdownOutcome::StartGrace if self.config.grace_ticks == 0 => {
                round.trigger_advance(AdvanceReason::GracePeriod)
            }
            CountdownOutcome::StartGrace => {
                let grace = self.config.tick.saturating_mul(self.config.grace_ticks);
                self.grace.arm(grace);
                debug!(round = round.round_number(), ?grace, "grace period started");
                None
            }
            CountdownOutcome::Nothing => None,
        }
    }

    fn on_grace_expired(&mut self) -> Option<Advance> {
        let round = self.round.as_mut()?;
        warn!(
            round = round.round_number(),
            ready = round.server_ready_count(),
            expected = round.expected_participants(),
            "no quorum within grace period, advancing anyway"
        );
        round.trigger_advance(AdvanceReason::GracePeriod)
    }

    fn finish_round(&mut self, advance: Advance) {
        self.countdown.cancel();
        self.grace.cancel();
        info!(round = advance.round, reason = ?advance.reason, "advancing round");
    }

    fn publish(&self) {
        let status = match &self.round {
            Some(round) => ReadinessStatus {
                round_number: Some(round.round_number()),
                phase: round.phase(),
                countdown_remaining: self.countdown_remaining,
                grace_active: self.grace.is_armed(),
                server_ready_count: round.server_ready_count(),
                expected_participants: round.expected_participants(),
                advanced: round.advance_triggered(),
            },
            None => ReadinessStatus::default(),
        };
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}

async fn readiness_loop<S: FrameSink>(
    mut driver: Driver<S>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    advance_tx: mpsc::Sender<Advance>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("readiness loop started");

    loop {
        let advance = tokio::select! {
            _ = &mut shutdown_rx => break,
            command = cmd_rx.recv() => match command {
                Some(command) => driver.on_command(command),
                None => break,
            },
            () = driver.countdown.fired() => driver.on_tick(),
            () = driver.grace.fired() => driver.on_grace_expired(),
        };

        if let Some(advance) = advance {
            driver.finish_round(advance);
            driver.publish();
            if advance_tx.send(advance).await.is_err() {
                debug!("advance receiver dropped");
            }
        } else {
            driver.publish();
        }
    }

    driver.countdown.cancel();
    driver.grace.cancel();
    debug!("readiness loop exited");
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

    fn sent(_: &ClientFrame) -> bool {
        true
    }

    fn failed(_: &ClientFrame) -> bool {
        false
    }

    #[test]
    fn two_player_quorum_advances_once() {
        let mut round = RoundReadiness::new(1, 2);
        assert_eq!(round.mark_local_ready(sent), None);
        assert_eq!(round.phase(), ReadinessPhase::SignalSent);

        assert_eq!(
            round.observe_server(&ResultsReadyPayload::aggregate(1, 1, 2)),
            None
        );
        let advance = round.observe_server(&ResultsReadyPayload::aggregate(1, 2, 2));
        assert_eq!(
            advance,
            Some(Advance {
                round: 1,
                reason: AdvanceReason::Quorum
            })
        );
        assert_eq!(round.expected_participants(), 2);

        // Duplicates and later triggers are absorbed.
        assert_eq!(
            round.observe_server(&ResultsReadyPayload::aggregate(1, 2, 2)),
            None
        );
        assert_eq!(round.countdown_expired(sent), CountdownOutcome::Nothing);
        assert_eq!(round.trigger_advance(AdvanceReason::GracePeriod), None);
    }

    fn peer(round: u32, player: &str, ready: bool) -> ResultsReadyPayload {
        ResultsReadyPayload {
            player_id: Some(player.into()),
            ready,
            ..ResultsReadyPayload::signal(round)
        }
    }

    #[test]
    fn per_player_signals_reach_quorum() {
        let mut round = RoundReadiness::new(1, 2);
        round.mark_local_ready(sent);

        assert_eq!(round.observe_server(&peer(1, "p1", true)), None);
        assert_eq!(round.server_ready_count(), 1);
        assert_eq!(
            round.observe_server(&peer(1, "p2", true)),
            Some(Advance {
                round: 1,
                reason: AdvanceReason::Quorum
            })
        );
        assert_eq!(round.server_ready_count(), 2);
    }

    #[test]
    fn repeated_peer_signal_counts_once() {
        let mut round = RoundReadiness::new(1, 3);
        round.observe_server(&peer(1, "p1", true));
        round.observe_server(&peer(1, "p1", true));
        assert_eq!(round.server_ready_count(), 1);

        round.observe_server(&peer(1, "p1", false));
        assert_eq!(round.server_ready_count(), 0);
        assert!(!round.advance_triggered());
    }

    #[test]
    fn unnamed_signals_count_without_an_aggregate() {
        let mut round = RoundReadiness::new(1, 2);
        round.observe_server(&ResultsReadyPayload::signal(1));
        assert_eq!(round.server_ready_count(), 1);
        assert!(round
            .observe_server(&ResultsReadyPayload::signal(1))
            .is_some());
    }

    #[test]
    fn aggregate_and_signals_take_the_larger_count() {
        let mut round = RoundReadiness::new(1, 4);
        round.observe_server(&peer(1, "p1", true));
        round.observe_server(&peer(1, "p2", true));
        round.observe_server(&ResultsReadyPayload::aggregate(1, 1, 4));
        assert_eq!(round.server_ready_count(), 2);

        round.observe_server(&ResultsReadyPayload::aggregate(1, 3, 4));
        assert_eq!(round.server_ready_count(), 3);
    }

    #[test]
    fn expected_is_max_of_all_signals() {
        let mut round = RoundReadiness::new(4, 2);
        round.observe_submissions(3);
        assert_eq!(round.expected_participants(), 3);
        round.observe_server(&ResultsReadyPayload::aggregate(4, 0, 5));
        assert_eq!(round.expected_participants(), 5);
        round.observe_roster(1);
        assert_eq!(round.expected_participants(), 5);
    }

    #[test]
    fn stale_round_aggregate_is_ignored() {
        let mut round = RoundReadiness::new(2, 1);
        assert_eq!(
            round.observe_server(&ResultsReadyPayload::aggregate(1, 9, 1)),
            None
        );
        assert_eq!(round.server_ready_count(), 0);
        assert!(!round.advance_triggered());
    }

    #[test]
    fn failed_send_falls_back_and_advances_immediately() {
        let mut round = RoundReadiness::new(3, 0);
        let outcome = round.countdown_expired(failed);
        assert_eq!(
            outcome,
            CountdownOutcome::Advanced(Advance {
                round: 3,
                reason: AdvanceReason::LocalFallback
            })
        );
        assert!(round.local_fallback_ready());
        assert!(round.expected_participants() >= 1);
        assert!(!round.self_signaled());
    }

    #[test]
    fn signaled_without_quorum_asks_for_grace() {
        let mut round = RoundReadiness::new(1, 3);
        round.mark_local_ready(sent);
        assert_eq!(round.countdown_expired(sent), CountdownOutcome::StartGrace);
        assert!(!round.advance_triggered());
    }

    #[test]
    fn no_signal_after_advance() {
        let mut round = RoundReadiness::new(1, 1);
        round.observe_server(&ResultsReadyPayload::aggregate(1, 1, 1));
        assert!(round.advance_triggered());

        let mut calls = 0;
        round.mark_local_ready(|_| {
            calls += 1;
            true
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn any_trigger_order_advances_exactly_once() {
        #[derive(Clone, Copy)]
        enum Trigger {
            Quorum,
            Countdown,
            Grace,
        }
        let orders = [
            [Trigger::Quorum, Trigger::Countdown, Trigger::Grace],
            [Trigger::Quorum, Trigger::Grace, Trigger::Countdown],
            [Trigger::Countdown, Trigger::Quorum, Trigger::Grace],
            [Trigger::Countdown, Trigger::Grace, Trigger::Quorum],
            [Trigger::Grace, Trigger::Quorum, Trigger::Countdown],
            [Trigger::Grace, Trigger::Countdown, Trigger::Quorum],
        ];

        for order in orders {
            for send_ok in [true, false] {
                let mut round = RoundReadiness::new(7, 2);
                let mut advances = 0;
                for trigger in order {
                    let fired = match trigger {
                        Trigger::Quorum => round
                            .observe_server(&ResultsReadyPayload::aggregate(7, 2, 2))
                            .is_some(),
                        Trigger::Countdown => matches!(
                            round.countdown_expired(|_| send_ok),
                            CountdownOutcome::Advanced(_)
                        ),
                        Trigger::Grace => round
                            .trigger_advance(AdvanceReason::GracePeriod)
                            .is_some(),
                    };
                    advances += usize::from(fired);
                }
                assert_eq!(advances, 1);
                assert!(round.advance_triggered());
            }
        }
    }
}
