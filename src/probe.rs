//! Liveness probe against the monitored service.
//!
//! A probe is a single GET. Any 2xx is healthy; every other status, and any
//! transport failure, is unhealthy. Transport failures are folded into the
//! result instead of being returned as errors so a tick always continues.

use reqwest::StatusCode;
use serde::Serialize;

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeResult {
    Healthy {
        status: u16,
    },
    Unhealthy {
        /// `None` when no response was received
        status: Option<u16>,
        /// Transport error message, if any
        error: Option<String>,
    },
}

impl ProbeResult {
    /// Classify a received status code
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            ProbeResult::Healthy {
                status: status.as_u16(),
            }
        } else {
            ProbeResult::Unhealthy {
                status: Some(status.as_u16()),
                error: None,
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeResult::Healthy { status } => Some(*status),
            ProbeResult::Unhealthy { status, .. } => *status,
        }
    }
}

/// Issues liveness probes with the shared HTTP client
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and classify the response.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        match self.client.get(url).send().await {
            Ok(response) => ProbeResult::from_status(response.status()),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Probe request failed");
                ProbeResult::Unhealthy {
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
