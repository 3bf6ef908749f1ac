//! Failure-tracking state shared across ticks.

use serde::Serialize;

use crate::remediation::RemediationOutcome;

/// Where the watchdog stands relative to the failure threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No consecutive failures
    Healthy,
    /// Some failures, below the threshold
    Degraded,
    /// At or above the threshold; remediation runs on this tick
    Remediating,
}

/// Consecutive-failure counter.
///
/// Owned by the [`Watchdog`](crate::watchdog::Watchdog) behind a mutex so only
/// one tick mutates it at a time. Lives for the process lifetime; nothing is
/// persisted across restarts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchdogState {
    consecutive_failures: u32,
}

impl WatchdogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn phase(&self, threshold: u32) -> Phase {
        match self.consecutive_failures {
            0 => Phase::Healthy,
            n if n < threshold => Phase::Degraded,
            _ => Phase::Remediating,
        }
    }

    /// A healthy probe clears all history.
    pub fn record_healthy(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count an unhealthy probe. Returns true when remediation must run.
    ///
    /// The counter is capped at `threshold`: once reached, further failures
    /// keep triggering remediation without growing the count.
    pub fn record_unhealthy(&mut self, threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1).min(threshold);
        self.consecutive_failures >= threshold
    }

    /// Adjust the counter after a remediation attempt.
    pub fn apply_outcome(&mut self, outcome: &RemediationOutcome, reset_on_success: bool) {
        match outcome {
            RemediationOutcome::RestartFailed { .. } => self.consecutive_failures = 0,
            RemediationOutcome::Restarted if reset_on_success => self.consecutive_failures = 0,
            RemediationOutcome::Restarted | RemediationOutcome::Aborted { .. } => {}
        }
    }
}
