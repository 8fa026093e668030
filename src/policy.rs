//! Readiness and retry policy.
//!
//! Single source of truth for the timing constants used by the transport
//! resolver, the dispatcher's bridge probe, and the pollers. Values are
//! loaded from the `[readiness]` and `[polling]` config sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fastest permitted readiness poll step (10 Hz).
pub const MIN_READY_STEP_MS: u64 = 100;

/// Default time to wait for any transport at startup.
pub const DEFAULT_INITIAL_WAIT_MS: u64 = 5_000;

/// Default window per bridge capability re-probe.
pub const DEFAULT_BRIDGE_PROBE_WINDOW_MS: u64 = 1_500;

/// Default number of bridge re-probes after a failed capability check.
pub const DEFAULT_BRIDGE_PROBE_RETRIES: u32 = 2;

/// Default update progress poll interval.
pub const DEFAULT_UPDATE_POLL_MS: u64 = 500;

/// Default scheduler status poll interval.
pub const DEFAULT_SCHEDULER_POLL_SECS: u64 = 30;

/// Default delay before retrying a failed scheduler status poll.
pub const DEFAULT_SCHEDULER_RETRY_MS: u64 = 2_000;

/// How long to wait for transports to become ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Initial readiness wait in milliseconds.
    pub initial_wait_ms: u64,
    /// Readiness poll step in milliseconds. Values below 100 are clamped.
    pub step_ms: u64,
    /// Window for each bridge capability re-probe, in milliseconds.
    pub bridge_probe_window_ms: u64,
    /// Number of bridge re-probes before giving up.
    pub bridge_probe_retries: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_wait_ms: DEFAULT_INITIAL_WAIT_MS,
            step_ms: MIN_READY_STEP_MS,
            bridge_probe_window_ms: DEFAULT_BRIDGE_PROBE_WINDOW_MS,
            bridge_probe_retries: DEFAULT_BRIDGE_PROBE_RETRIES,
        }
    }
}

impl ReadinessPolicy {
    /// Initial readiness wait.
    #[must_use]
    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }

    /// Readiness poll step, never faster than [`MIN_READY_STEP_MS`].
    #[must_use]
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms.max(MIN_READY_STEP_MS))
    }

    /// Window for a single bridge capability re-probe.
    #[must_use]
    pub fn bridge_probe_window(&self) -> Duration {
        Duration::from_millis(self.bridge_probe_window_ms)
    }

    /// Upper bound on the time a single dispatch spends waiting for the bridge.
    #[must_use]
    pub fn bridge_budget(&self) -> Duration {
        self.bridge_probe_window() * self.bridge_probe_retries
    }
}

/// Poll cadences for long-running and background status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingPolicy {
    /// Update progress poll interval in milliseconds.
    pub update_interval_ms: u64,
    /// Scheduler status poll interval in seconds.
    pub scheduler_interval_secs: u64,
    /// Delay before retrying a failed scheduler status poll, in milliseconds.
    pub scheduler_retry_ms: u64,
    /// Stop a progress poller after this many consecutive failed polls.
    ///
    /// `None` keeps polling until a terminal stage or cancellation.
    pub max_consecutive_poll_errors: Option<u32>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_POLL_MS,
            scheduler_interval_secs: DEFAULT_SCHEDULER_POLL_SECS,
            scheduler_retry_ms: DEFAULT_SCHEDULER_RETRY_MS,
            max_consecutive_poll_errors: None,
        }
    }
}

impl PollingPolicy {
    /// Update progress poll interval.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    /// Scheduler status poll interval.
    #[must_use]
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }

    /// Delay before retrying a failed scheduler status poll.
    #[must_use]
    pub fn scheduler_retry(&self) -> Duration {
        Duration::from_millis(self.scheduler_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let r = ReadinessPolicy::default();
        assert_eq!(r.initial_wait(), Duration::from_secs(5));
        assert_eq!(r.step(), Duration::from_millis(100));
        assert_eq!(r.bridge_probe_retries, 2);

        let p = PollingPolicy::default();
        assert_eq!(p.update_interval(), Duration::from_millis(500));
        assert_eq!(p.scheduler_interval(), Duration::from_secs(30));
        assert_eq!(p.scheduler_retry(), Duration::from_secs(2));
        assert!(p.max_consecutive_poll_errors.is_none());
    }

    #[test]
    fn step_is_clamped_to_ten_hertz() {
        let r = ReadinessPolicy {
            step_ms: 5,
            ..Default::default()
        };
        assert_eq!(r.step(), Duration::from_millis(MIN_READY_STEP_MS));
    }

    #[test]
    fn bridge_budget_is_bounded() {
        let r = ReadinessPolicy::default();
        assert_eq!(r.bridge_budget(), Duration::from_millis(3_000));
    }
}
