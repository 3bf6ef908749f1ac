//! Tick orchestration: probe, update the failure counter, remediate.
//!
//! Each tick runs inside a `tick` span carrying a UUID v4 `tick_id`, so every
//! log line from the probe and the remediation flow can be correlated.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::http;
use crate::probe::{ProbeResult, Prober};
use crate::remediation::{RemediationOutcome, Remediator};
use crate::state::{Phase, WatchdogState};

/// What happened during one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` when probing was skipped because no target is configured
    pub probe: Option<ProbeResult>,
    /// `None` when the threshold was not reached
    pub remediation: Option<RemediationOutcome>,
    /// Counter value after the tick
    pub consecutive_failures: u32,
    pub phase: Phase,
}

/// Health-monitoring watchdog for a single target.
#[derive(Clone)]
pub struct Watchdog {
    config: Arc<AppConfig>,
    prober: Prober,
    remediator: Remediator,
    state: Arc<Mutex<WatchdogState>>,
}

impl Watchdog {
    /// Build a watchdog with its own HTTP client.
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let client = http::build_client(&config.watchdog)?;
        Ok(Self::with_client(config, client))
    }

    /// Build a watchdog around an existing HTTP client.
    pub fn with_client(config: AppConfig, client: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            prober: Prober::new(client.clone()),
            remediator: Remediator::new(client),
            state: Arc::new(Mutex::new(WatchdogState::new())),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures()
    }

    /// Run one check-and-remediate cycle.
    ///
    /// The state lock is held for the whole tick, so overlapping calls run
    /// one after the other. Never returns an error: every failure is logged
    /// and reflected in the report.
    pub async fn tick(&self) -> TickReport {
        let tick_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "tick",
            tick_id = %tick_id,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let report = self.run_tick(tick_id).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::info!(
                consecutive_failures = report.consecutive_failures,
                phase = ?report.phase,
                duration_ms,
                "Tick completed"
            );

            report
        }
        .instrument(span)
        .await
    }

    async fn run_tick(&self, tick_id: Uuid) -> TickReport {
        let started_at = Utc::now();
        let threshold = self.config.watchdog.failure_threshold;
        let mut state = self.state.lock().await;

        let Some(url) = self.config.target.probe_url() else {
            tracing::debug!("No BaseURL configured, skipping probe");
            return TickReport {
                tick_id,
                started_at,
                probe: None,
                remediation: None,
                consecutive_failures: state.consecutive_failures(),
                phase: state.phase(threshold),
            };
        };

        tracing::info!(url = %url, "Probing target");
        let probe = self.prober.probe(&url).await;

        let mut remediation = None;
        match &probe {
            ProbeResult::Healthy { status } => {
                state.record_healthy();
                tracing::info!(
                    status = *status,
                    consecutive_failures = state.consecutive_failures(),
                    "Target healthy"
                );
            }
            ProbeResult::Unhealthy { status, error } => {
                let remediate = state.record_unhealthy(threshold);
                tracing::warn!(
                    status = ?status,
                    error = ?error,
                    consecutive_failures = state.consecutive_failures(),
                    threshold,
                    "Target unhealthy"
                );

                if remediate {
                    let outcome = self.remediator.remediate(&self.config).await;
                    state.apply_outcome(&outcome, self.config.watchdog.reset_on_restart_success);
                    remediation = Some(outcome);
                }
            }
        }

        TickReport {
            tick_id,
            started_at,
            probe: Some(probe),
            remediation,
            consecutive_failures: state.consecutive_failures(),
            phase: state.phase(threshold),
        }
    }
}
