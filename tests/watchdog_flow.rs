//! End-to-end tick tests against mock target, identity and management servers.
//!
//! Run with: cargo test --test watchdog_flow

use healthwatch::config::AppConfig;
use healthwatch::probe::ProbeResult;
use healthwatch::remediation::RemediationOutcome;
use healthwatch::state::Phase;
use healthwatch::Watchdog;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "tenant-id";
const TOKEN_PATH: &str = "/tenant-id/oauth2/v2.0/token";
const RESTART_PATH: &str =
    "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Web/sites/site-1/restart";
const ACCESS_TOKEN: &str = "mock-access-token";

/// Mock target, identity provider, and management API
struct Harness {
    target: MockServer,
    login: MockServer,
    management: MockServer,
}

impl Harness {
    async fn start() -> Self {
        Self {
            target: MockServer::start().await,
            login: MockServer::start().await,
            management: MockServer::start().await,
        }
    }

    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.target.base_url = Some(self.target.uri());
        config.login.base_url = Some(self.login.uri());
        config.login.client_id = Some("client-id".to_string());
        config.login.client_secret = Some("s3cret".to_string());
        config.login.tenant_id = Some(TENANT.to_string());
        config.management.base_url = Some(self.management.uri());
        config.management.subscription_id = Some("sub-1".to_string());
        config.management.resource_group = Some("rg-1".to_string());
        config.management.app_service = Some("site-1".to_string());
        config
    }

    fn watchdog(&self, config: AppConfig) -> Watchdog {
        Watchdog::new(config).expect("watchdog should build")
    }

    async fn probe_returns(&self, status: u16) {
        self.target.reset().await;
        Mock::given(method("GET"))
            .and(path("/weatherforecast"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.target)
            .await;
    }

    async fn token_returns(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(template)
            .mount(&self.login)
            .await;
    }

    async fn restart_returns(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(RESTART_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.management)
            .await;
    }

    async fn token_requests(&self) -> usize {
        count(&self.login).await
    }

    async fn restart_requests(&self) -> usize {
        count(&self.management).await
    }
}

async fn count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

/// Base URL of a port nothing listens on
fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

fn valid_token() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": ACCESS_TOKEN,
    }))
}

// =============================================================================
// Threshold behaviour
// =============================================================================

#[tokio::test]
async fn test_single_failure_does_not_remediate() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    let watchdog = harness.watchdog(harness.config());

    let report = watchdog.tick().await;

    assert_eq!(
        report.probe,
        Some(ProbeResult::Unhealthy {
            status: Some(500),
            error: None
        })
    );
    assert!(report.remediation.is_none());
    assert_eq!(report.consecutive_failures, 1);
    assert_eq!(report.phase, Phase::Degraded);
    assert_eq!(harness.token_requests().await, 0);
    assert_eq!(harness.restart_requests().await, 0);
}

#[tokio::test]
async fn test_two_failures_restart_once() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    harness.restart_returns(200).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert_eq!(report.remediation, Some(RemediationOutcome::Restarted));
    assert_eq!(harness.token_requests().await, 1);
    assert_eq!(harness.restart_requests().await, 1);
    // Reset on success is the default policy
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(watchdog.consecutive_failures().await, 0);
}

#[tokio::test]
async fn test_success_without_reset_keeps_threshold() {
    let harness = Harness::start().await;
    harness.probe_returns(503).await;
    harness.token_returns(valid_token()).await;
    harness.restart_returns(200).await;
    let mut config = harness.config();
    config.watchdog.reset_on_restart_success = false;
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;
    assert_eq!(report.remediation, Some(RemediationOutcome::Restarted));
    assert_eq!(report.consecutive_failures, 2);

    // The very next failure restarts again
    let report = watchdog.tick().await;
    assert_eq!(report.remediation, Some(RemediationOutcome::Restarted));
    assert_eq!(harness.restart_requests().await, 2);
}

#[tokio::test]
async fn test_healthy_probe_resets_counter() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    assert_eq!(watchdog.consecutive_failures().await, 1);

    harness.probe_returns(200).await;
    let report = watchdog.tick().await;
    assert!(report.probe.as_ref().is_some_and(ProbeResult::is_healthy));
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(report.phase, Phase::Healthy);

    // Failure history is gone: one more failure is not enough
    harness.probe_returns(500).await;
    let report = watchdog.tick().await;
    assert!(report.remediation.is_none());
    assert_eq!(harness.token_requests().await, 0);
}

#[tokio::test]
async fn test_redirect_counts_as_unhealthy() {
    let harness = Harness::start().await;
    harness.probe_returns(302).await;
    let watchdog = harness.watchdog(harness.config());

    let report = watchdog.tick().await;

    assert_eq!(report.probe.and_then(|p| p.status()), Some(302));
    assert_eq!(report.consecutive_failures, 1);
}

#[tokio::test]
async fn test_unreachable_target_counts_as_failure() {
    let harness = Harness::start().await;
    let mut config = harness.config();
    config.target.base_url = Some(unreachable_url());
    let watchdog = harness.watchdog(config);

    let report = watchdog.tick().await;

    match report.probe {
        Some(ProbeResult::Unhealthy { status: None, error }) => assert!(error.is_some()),
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert_eq!(report.consecutive_failures, 1);
}

// =============================================================================
// Remediation call chain
// =============================================================================

#[tokio::test]
async fn test_token_request_shape() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("client_id=client-id"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope="))
        .respond_with(valid_token())
        .expect(1)
        .mount(&harness.login)
        .await;
    Mock::given(method("POST"))
        .and(path(RESTART_PATH))
        .and(query_param("api-version", "2023-01-01"))
        .and(header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.management)
        .await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert_eq!(report.remediation, Some(RemediationOutcome::Restarted));
    harness.login.verify().await;
    harness.management.verify().await;

    let requests = harness.login.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    let expected_scope = format!("{}/.default", harness.management.uri());
    assert!(body.contains(&urlencoding::encode(&expected_scope).into_owned()));
}

#[tokio::test]
async fn test_token_rejection_skips_restart_and_keeps_count() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness
        .token_returns(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .await;
    harness.restart_returns(200).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    match report.remediation {
        Some(RemediationOutcome::Aborted { reason }) => assert!(reason.contains("401")),
        other => panic!("expected aborted remediation, got {:?}", other),
    }
    assert_eq!(report.consecutive_failures, 2);
    assert_eq!(harness.restart_requests().await, 0);

    // Counter is still at the threshold, so the next failure retries
    watchdog.tick().await;
    assert_eq!(harness.token_requests().await, 2);
}

#[tokio::test]
async fn test_non_200_success_from_login_is_rejected() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(ResponseTemplate::new(202)).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert!(matches!(
        report.remediation,
        Some(RemediationOutcome::Aborted { .. })
    ));
    assert_eq!(harness.restart_requests().await, 0);
}

#[tokio::test]
async fn test_malformed_token_aborts() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness
        .token_returns(ResponseTemplate::new(200).set_body_string("{\"token_type\":\"Bearer\"}"))
        .await;
    harness.restart_returns(200).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert!(matches!(
        report.remediation,
        Some(RemediationOutcome::Aborted { .. })
    ));
    assert_eq!(report.consecutive_failures, 2);
    assert_eq!(harness.restart_requests().await, 0);
}

#[tokio::test]
async fn test_restart_failure_resets_counter() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    harness.restart_returns(500).await;
    let watchdog = harness.watchdog(harness.config());

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert!(matches!(
        report.remediation,
        Some(RemediationOutcome::RestartFailed { .. })
    ));
    assert_eq!(report.consecutive_failures, 0);

    // Two more failures are needed before the next attempt
    let report = watchdog.tick().await;
    assert!(report.remediation.is_none());
    assert_eq!(harness.restart_requests().await, 1);
}

#[tokio::test]
async fn test_unreachable_restart_endpoint_resets_counter() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    let mut config = harness.config();
    config.management.base_url = Some(unreachable_url());
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert!(matches!(
        report.remediation,
        Some(RemediationOutcome::RestartFailed { .. })
    ));
    assert_eq!(report.consecutive_failures, 0);
    assert_eq!(harness.token_requests().await, 1);
}

#[tokio::test]
async fn test_unreachable_login_endpoint_keeps_count() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.restart_returns(200).await;
    let mut config = harness.config();
    config.login.base_url = Some(unreachable_url());
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;

    assert!(matches!(
        report.remediation,
        Some(RemediationOutcome::Aborted { .. })
    ));
    assert_eq!(report.consecutive_failures, 2);
    assert_eq!(harness.restart_requests().await, 0);

    // Still at the threshold, so the next failure tries again
    let report = watchdog.tick().await;
    assert!(report.remediation.is_some());
}

#[tokio::test]
async fn test_missing_login_config_aborts_without_calls() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    let mut config = harness.config();
    config.login.client_secret = None;
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;

    match report.remediation {
        Some(RemediationOutcome::Aborted { reason }) => assert!(reason.contains("ClientSecret")),
        other => panic!("expected aborted remediation, got {:?}", other),
    }
    assert_eq!(report.consecutive_failures, 2);
    assert_eq!(harness.token_requests().await, 0);
}

#[tokio::test]
async fn test_missing_management_config_aborts_after_login() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    let mut config = harness.config();
    config.management.app_service = None;
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;

    match report.remediation {
        Some(RemediationOutcome::Aborted { reason }) => assert!(reason.contains("AppServiceName")),
        other => panic!("expected aborted remediation, got {:?}", other),
    }
    assert_eq!(harness.token_requests().await, 1);
    assert_eq!(harness.restart_requests().await, 0);
    assert_eq!(report.consecutive_failures, 2);
}

// =============================================================================
// Configuration and scheduling
// =============================================================================

#[tokio::test]
async fn test_missing_base_url_makes_no_calls() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    let mut config = harness.config();
    config.target.base_url = None;
    let watchdog = harness.watchdog(config);

    let report = watchdog.tick().await;

    assert!(report.probe.is_none());
    assert_eq!(count(&harness.target).await, 0);
    assert_eq!(report.consecutive_failures, 0);
}

#[tokio::test]
async fn test_concurrent_ticks_remediate_once() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    harness.restart_returns(200).await;
    let watchdog = harness.watchdog(harness.config());

    let (a, b) = tokio::join!(watchdog.tick(), watchdog.tick());

    let remediations = [a, b]
        .iter()
        .filter(|report| report.remediation.is_some())
        .count();
    assert_eq!(remediations, 1);
    assert_eq!(harness.token_requests().await, 1);
    assert_eq!(harness.restart_requests().await, 1);
}

#[tokio::test]
async fn test_custom_threshold() {
    let harness = Harness::start().await;
    harness.probe_returns(500).await;
    harness.token_returns(valid_token()).await;
    harness.restart_returns(200).await;
    let mut config = harness.config();
    config.watchdog.failure_threshold = 3;
    let watchdog = harness.watchdog(config);

    watchdog.tick().await;
    let report = watchdog.tick().await;
    assert!(report.remediation.is_none());
    assert_eq!(report.consecutive_failures, 2);

    let report = watchdog.tick().await;
    assert_eq!(report.remediation, Some(RemediationOutcome::Restarted));
}
