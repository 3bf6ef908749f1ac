//! Remediation flow: obtain a management token, then restart the App Service.
//!
//! The flow is:
//! 1. Resolve identity settings (login URL, client credentials, tenant)
//! 2. POST a client-credentials grant to `<login>/<tenant>/oauth2/v2.0/token`
//! 3. Extract `access_token` from the JSON response
//! 4. Resolve management settings (subscription, resource group, site)
//! 5. POST `.../sites/<name>/restart` with the bearer token and an empty body
//!
//! A fresh token is requested on every attempt; expiry is not tracked.

use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, LoginSettings, ManagementSettings, CLIENT_CREDENTIALS_GRANT};
use crate::error::RemediationError;

/// Bearer token for the management API
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Token response from the identity endpoint.
/// Only `access_token` is read; `expires_in` and friends are ignored.
#[derive(Debug, Deserialize)]
struct TokenResponseData {
    #[serde(default)]
    access_token: Option<String>,
}

/// Parse a token endpoint body into an access token
pub fn parse_token_response(body: &str) -> Result<AccessToken, RemediationError> {
    let data: TokenResponseData = serde_json::from_str(body)
        .map_err(|e| RemediationError::MalformedToken(format!("invalid JSON: {}", e)))?;

    match data.access_token {
        Some(token) if !token.is_empty() => Ok(AccessToken(token)),
        _ => Err(RemediationError::MissingToken {
            body: body.to_string(),
        }),
    }
}

/// Result of one remediation attempt, as seen by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemediationOutcome {
    /// Restart call succeeded
    Restarted,
    /// Flow stopped before the restart call; retried next tick
    Aborted { reason: String },
    /// Restart call was made and failed; the failure counter is reset
    RestartFailed { reason: String },
}

impl From<Result<(), RemediationError>> for RemediationOutcome {
    fn from(result: Result<(), RemediationError>) -> Self {
        match result {
            Ok(()) => RemediationOutcome::Restarted,
            Err(e) if e.is_restart_failure() => RemediationOutcome::RestartFailed {
                reason: e.to_string(),
            },
            Err(e) => RemediationOutcome::Aborted {
                reason: e.to_string(),
            },
        }
    }
}

/// Authenticates against the identity provider and restarts the target
#[derive(Clone)]
pub struct Remediator {
    http_client: reqwest::Client,
}

impl Remediator {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Run the whole flow. Never fails; every error becomes an outcome.
    pub async fn remediate(&self, config: &AppConfig) -> RemediationOutcome {
        let result = self.run(config).await;

        match &result {
            Ok(()) => tracing::info!("Appservice restarted successfully"),
            Err(e @ RemediationError::MissingConfig(_)) => {
                tracing::error!(error = %e, "Remediation skipped, configuration incomplete");
            }
            Err(e) if e.is_restart_failure() => {
                tracing::error!(error = %e, "Failed to restart appservice");
            }
            // Already logged with the response by fetch_token
            Err(RemediationError::TokenRejected { .. })
            | Err(RemediationError::MalformedToken(_))
            | Err(RemediationError::MissingToken { .. }) => {
                tracing::debug!("Remediation aborted, will retry next tick");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remediation aborted, will retry next tick");
            }
        }

        RemediationOutcome::from(result)
    }

    async fn run(&self, config: &AppConfig) -> Result<(), RemediationError> {
        let login = config.login_settings()?;
        let token = self.fetch_token(&login).await?;
        let management = config.management_settings()?;
        self.restart(&management, &token).await
    }

    /// Request a client-credentials token for the management API.
    pub async fn fetch_token(
        &self,
        login: &LoginSettings<'_>,
    ) -> Result<AccessToken, RemediationError> {
        let url = login.token_url();
        let scope = login.scope();
        let params = [
            ("client_id", login.client_id),
            ("client_secret", login.client_secret),
            ("grant_type", CLIENT_CREDENTIALS_GRANT),
            ("scope", scope.as_str()),
        ];

        tracing::info!(url = %url, "Requesting management token");

        let response = self
            .http_client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|source| RemediationError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Azure login failed");
            return Err(RemediationError::TokenRejected { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|source| RemediationError::Transport { url, source })?;

        parse_token_response(&body).inspect_err(|e| match e {
            // No token in the body, so it is safe to log
            RemediationError::MissingToken { body } => {
                tracing::error!(body = %body, "Token response has no access_token");
            }
            _ => {
                tracing::error!(error = %e, body_len = body.len(), "Could not read access token");
            }
        })
    }

    /// Restart the configured App Service.
    pub async fn restart(
        &self,
        management: &ManagementSettings<'_>,
        token: &AccessToken,
    ) -> Result<(), RemediationError> {
        let url = management.restart_url();

        tracing::info!(
            app_service = %management.app_service,
            resource_group = %management.resource_group,
            "Requesting appservice restart"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.secret())
            .body("")
            .send()
            .await
            .map_err(|source| RemediationError::RestartUnreachable {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::info!(status = %status, body = %body, "Restart status");
            return Err(RemediationError::RestartRejected { status, body });
        }

        tracing::debug!(status = %status, "Restart accepted");
        Ok(())
    }
}
