use reqwest::StatusCode;

use crate::config::{ConfigError, MissingSettings};

/// Failure of one step of the remediation flow.
///
/// None of these escape a tick; the watchdog maps each one to a
/// [`RemediationOutcome`](crate::remediation::RemediationOutcome) and logs it.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("Configuration error: {0}")]
    MissingConfig(#[from] MissingSettings),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Azure login failed with status code {status}: {body}")]
    TokenRejected { status: StatusCode, body: String },

    #[error("Malformed token response: {0}")]
    MalformedToken(String),

    #[error("Token response has no access_token: {body}")]
    MissingToken { body: String },

    #[error("Restart request returned {status}: {body}")]
    RestartRejected { status: StatusCode, body: String },

    #[error("Restart request to {url} failed: {source}")]
    RestartUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl RemediationError {
    /// True when the restart call was attempted and did not succeed.
    ///
    /// This is the only failure that resets the failure counter; every other
    /// failure leaves it at the threshold so the next tick retries.
    pub fn is_restart_failure(&self) -> bool {
        matches!(
            self,
            RemediationError::RestartRejected { .. } | RemediationError::RestartUnreachable { .. }
        )
    }
}

/// Startup errors surfaced by the binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize tick report: {0}")]
    Report(#[from] serde_json::Error),
}
