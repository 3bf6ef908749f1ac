//! Outbound HTTP plumbing and process signal handling.
//!
//! One `reqwest::Client` is built at startup and shared by the prober and
//! the remediator. No timeout is set unless `watchdog.request_timeout_seconds`
//! is configured, so the client default governs every call. Redirects are
//! not followed: a 3xx from the liveness endpoint counts as unhealthy.

mod shutdown;

use std::time::Duration;

use crate::config::{WatchdogConfig, USER_AGENT};

pub use shutdown::shutdown_signal;

/// Build the shared HTTP client.
pub fn build_client(config: &WatchdogConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none());

    if let Some(secs) = config.request_timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder.build()
}
