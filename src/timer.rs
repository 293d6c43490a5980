//! Cancellable one-shot timer for use inside `tokio::select!`.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};

/// A timer that is either idle or armed to fire once.
///
/// [`fired`](Deadline::fired) never completes while idle, so an idle deadline
/// can sit in a `select!` branch without special-casing. Dropping the future
/// returned by `fired` keeps the timer armed.
#[derive(Debug, Default)]
pub(crate) struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    pub(crate) fn idle() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) to fire `after` from now.
    pub(crate) fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep(after)));
    }

    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Completes when the deadline passes, leaving the timer idle.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending::<()>().await,
        }
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
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let start = Instant::now();
        let mut deadline = Deadline::idle();
        deadline.arm(Duration::from_secs(3));
        deadline.fired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3_010));
        assert!(!deadline.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_deadline_never_fires() {
        let mut deadline = Deadline::idle();
        deadline.arm(Duration::from_secs(1));
        deadline.cancel();
        let result = timeout(Duration::from_secs(10), deadline.fired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_moves_the_deadline() {
        let start = Instant::now();
        let mut deadline = Deadline::idle();
        deadline.arm(Duration::from_secs(1));
        deadline.arm(Duration::from_secs(5));
        deadline.fired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_010));
    }
}
