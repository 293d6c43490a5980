//! Configuration for the connection adapter and readiness coordinator.
//!
//! Every setting has a default, so the usual way to build a config is
//! `Config::default()` followed by `with_*` overrides. All configs also
//! deserialize from any serde format with missing fields defaulted; durations
//! are written in milliseconds.
//!
//! ```
//! use room_sync_client::config::{ConnectionConfig, ReadinessConfig};
//! use std::time::Duration;
//!
//! let connection = ConnectionConfig::default()
//!     .with_backoff(Duration::from_millis(250), Duration::from_secs(5))
//!     .with_max_attempts(4);
//! assert_eq!(connection.max_attempts, 4);
//!
//! let readiness = ReadinessConfig::default().with_countdown_ticks(10);
//! assert_eq!(readiness.grace_ticks, 3);
//! ```

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
const DEFAULT_JITTER: Duration = Duration::from_millis(250);
const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_COUNTDOWN_TICKS: u32 = 30;
const DEFAULT_GRACE_TICKS: u32 = 3;
const DEFAULT_ADVANCE_CHANNEL_CAPACITY: usize = 16;

// ── ConnectionConfig ────────────────────────────────────────────────

/// Reconnect and shutdown behaviour of a [`ConnectionAdapter`](crate::connection::ConnectionAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Delay before the first reconnect attempt. Defaults to **500 ms**.
    #[serde(rename = "backoff_base_ms", with = "millis")]
    pub backoff_base: Duration,
    /// Upper bound on the reconnect delay. Defaults to **10 s**.
    #[serde(rename = "backoff_cap_ms", with = "millis")]
    pub backoff_cap: Duration,
    /// Maximum random delay added to each reconnect wait. Defaults to **250 ms**.
    #[serde(rename = "jitter_ms", with = "millis")]
    pub jitter: Duration,
    /// Failed cycles tolerated before giving up. Defaults to **8**.
    pub max_attempts: u32,
    /// Time given to the connection loop to close the transport on
    /// disconnect before it is aborted. Defaults to **1 s**.
    #[serde(rename = "shutdown_timeout_ms", with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            jitter: DEFAULT_JITTER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the base and cap of the exponential backoff.
    ///
    /// A cap below the base is raised to the base.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap.max(base);
        self
    }

    /// Set the maximum jitter added to each reconnect wait.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set how many failed cycles are tolerated before `PermanentlyFailed`.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the graceful disconnect timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── ReadinessConfig ─────────────────────────────────────────────────

/// Timing of the per-round readiness protocol.
///
/// The countdown and grace period are counted in ticks so the UI can show a
/// whole-number countdown.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Length of one tick. Defaults to **1 s**.
    #[serde(rename = "tick_ms", with = "millis")]
    pub tick: Duration,
    /// Ticks from round entry until local readiness is forced. Defaults to **30**.
    pub countdown_ticks: u32,
    /// Ticks after countdown expiry before advancement is forced. Defaults to **3**.
    pub grace_ticks: u32,
    /// Capacity of the advance event channel. Defaults to **16**; values below
    /// 1 are clamped to 1.
    pub advance_channel_capacity: usize,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
            grace_ticks: DEFAULT_GRACE_TICKS,
            advance_channel_capacity: DEFAULT_ADVANCE_CHANNEL_CAPACITY,
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn with_countdown_ticks(mut self, ticks: u32) -> Self {
        self.countdown_ticks = ticks;
        self
    }

    #[must_use]
    pub fn with_grace_ticks(mut self, ticks: u32) -> Self {
        self.grace_ticks = ticks;
        self
    }

    #[must_use]
    pub fn with_advance_channel_capacity(mut self, capacity: usize) -> Self {
        self.advance_channel_capacity = capacity.max(1);
        self
    }
}

// ── SessionConfig ───────────────────────────────────────────────────

/// Everything a [`RoomSession`](crate::session::RoomSession) needs to tune.
///
/// ```
/// use room_sync_client::config::SessionConfig;
///
/// let config: SessionConfig = serde_json::from_str(
///     r#"{"connection": {"max_attempts": 3}, "readiness": {"countdown_ticks": 20}}"#,
/// ).unwrap();
/// assert_eq!(config.connection.max_attempts, 3);
/// assert_eq!(config.readiness.countdown_ticks, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub readiness: ReadinessConfig,
}

impl SessionConfig {
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
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

    #[test]
    fn defaults_match_documentation() {
        let c = ConnectionConfig::default();
        assert_eq!(c.backoff_base, Duration::from_millis(500));
        assert_eq!(c.backoff_cap, Duration::from_secs(10));
        assert_eq!(c.max_attempts, 8);

        let r = ReadinessConfig::default();
        assert_eq!(r.tick, Duration::from_secs(1));
        assert_eq!(r.countdown_ticks, 30);
        assert_eq!(r.grace_ticks, 3);
    }

    #[test]
    fn cap_never_below_base() {
        let c = ConnectionConfig::default()
            .with_backoff(Duration::from_secs(2), Duration::from_millis(100));
        assert_eq!(c.backoff_cap, Duration::from_secs(2));
    }

    #[test]
    fn zero_advance_capacity_is_clamped() {
        let r = ReadinessConfig::default().with_advance_channel_capacity(0);
        assert_eq!(r.advance_channel_capacity, 1);
    }

    #[test]
    fn durations_deserialize_from_millis() {
        let c: ConnectionConfig =
            serde_json::from_str(r#"{"backoff_base_ms": 100, "jitter_ms": 0}"#).unwrap();
        assert_eq!(c.backoff_base, Duration::from_millis(100));
        assert_eq!(c.jitter, Duration::ZERO);
        assert_eq!(c.backoff_cap, Duration::from_secs(10));
    }
}
