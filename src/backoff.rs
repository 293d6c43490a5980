//! Exponential reconnect backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::ConnectionConfig;

/// Computes reconnect delays as `min(base · 2^(attempt − 1), cap)`.
///
/// `attempt` is 1-based: the first reconnect after a drop waits `base`.
/// Jitter is applied separately by [`Backoff::jittered`] so the reported
/// delay stays deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            jitter,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_cap, config.jitter)
    }

    /// Delay before reconnect attempt number `attempt`, without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// `delay` plus a uniformly random amount in `[0, jitter]`.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let extra_ms = rand::rng().random_range(0..=duration_ms(self.jitter));
        delay.saturating_add(Duration::from_millis(extra_ms))
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
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

    fn backoff() -> Backoff {
        Backoff::new(
            Duration::from_millis(100),
            Duration::from_millis(1_000),
            Duration::ZERO,
        )
    }

    #[test]
    fn first_attempt_waits_base() {
        assert_eq!(backoff().delay(1), Duration::from_millis(100));
        assert_eq!(backoff().delay(0), Duration::from_millis(100));
    }

    #[test]
    fn doubles_until_cap() {
        let b = backoff();
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(4), Duration::from_millis(800));
        assert_eq!(b.delay(5), Duration::from_millis(1_000));
        assert_eq!(b.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let b = backoff();
        let mut previous = Duration::ZERO;
        for attempt in 1..64 {
            let d = b.delay(attempt);
            assert!(d >= previous, "attempt {attempt}: {d:?} < {previous:?}");
            assert!(d <= Duration::from_millis(1_000));
            previous = d;
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let b = Backoff::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::from_millis(50),
        );
        for _ in 0..100 {
            let d = b.jittered(Duration::from_millis(100));
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        assert_eq!(
            backoff().jittered(Duration::from_millis(300)),
            Duration::from_millis(300)
        );
    }
}
