//! Configuration loading and constants.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. The environment names match the ones the
//! watchdog has always been deployed with (`BaseURL`, `ClientId`, ...).
//! `AppConfig` is the root configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

// =============================================================================
// Probe Constants
// =============================================================================

/// Liveness path appended to the target base URL
pub const DEFAULT_PROBE_PATH: &str = "/weatherforecast";

/// Consecutive unhealthy probes required before remediation
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Seconds between ticks (once per minute)
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Azure Constants
// =============================================================================

/// API version used for the App Service restart call
pub const DEFAULT_MANAGEMENT_API_VERSION: &str = "2023-01-01";

/// OAuth2 grant used to obtain the management token
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

/// Suffix appended to the management base URL to form the token scope
pub const DEFAULT_SCOPE_SUFFIX: &str = "/.default";

/// User-Agent sent with every outbound request
pub const USER_AGENT: &str = formatcp!(
    "{}/{}",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION")
);

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_BASE_URL: &str = "BaseURL";
pub const ENV_LOGIN_BASE_URL: &str = "AzureLoginBaseURL";
pub const ENV_CLIENT_ID: &str = "ClientId";
pub const ENV_CLIENT_SECRET: &str = "ClientSecret";
pub const ENV_TENANT_ID: &str = "TenantId";
pub const ENV_MANAGEMENT_BASE_URL: &str = "AzureManagementBaseURL";
pub const ENV_SUBSCRIPTION_ID: &str = "SubscriptionId";
pub const ENV_RESOURCE_GROUP: &str = "ResourceGroupName";
pub const ENV_APP_SERVICE: &str = "AppServiceName";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/healthwatch.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "healthwatch=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Service being probed
    #[serde(default)]
    pub target: TargetConfig,
    /// Identity provider used to obtain a management token
    #[serde(default)]
    pub login: LoginConfig,
    /// Management API and the resource to restart
    #[serde(default)]
    pub management: ManagementConfig,
    /// Tick cadence and failure policy
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Probe target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the monitored service. Probing is skipped when unset.
    pub base_url: Option<String>,
    #[serde(default = "TargetConfig::default_probe_path")]
    pub probe_path: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            probe_path: Self::default_probe_path(),
        }
    }
}

impl TargetConfig {
    fn default_probe_path() -> String {
        DEFAULT_PROBE_PATH.to_string()
    }

    /// Full liveness URL, or `None` when no base URL is configured
    pub fn probe_url(&self) -> Option<String> {
        let base = self.base_url.as_deref()?;
        Some(format!("{}{}", base.trim_end_matches('/'), self.probe_path))
    }
}

/// Identity provider settings. Every field is optional until remediation runs.
#[derive(Clone, Default, Deserialize)]
pub struct LoginConfig {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagementConfig {
    pub base_url: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub app_service: Option<String>,
    #[serde(default = "ManagementConfig::default_api_version")]
    pub api_version: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            subscription_id: None,
            resource_group: None,
            app_service: None,
            api_version: Self::default_api_version(),
        }
    }
}

impl ManagementConfig {
    fn default_api_version() -> String {
        DEFAULT_MANAGEMENT_API_VERSION.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Consecutive unhealthy probes that trigger remediation (default: 2)
    #[serde(default = "WatchdogConfig::default_threshold")]
    pub failure_threshold: u32,
    /// Seconds between ticks (default: 60)
    #[serde(default = "WatchdogConfig::default_interval")]
    pub interval_seconds: u64,
    /// Reset the failure counter after a successful restart (default: true).
    /// When false the counter stays at the threshold, so the next unhealthy
    /// probe triggers another restart immediately.
    #[serde(default = "WatchdogConfig::default_reset_on_success")]
    pub reset_on_restart_success: bool,
    /// Per-request timeout in seconds. Unset keeps the HTTP client default.
    pub request_timeout_seconds: Option<u64>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_threshold(),
            interval_seconds: Self::default_interval(),
            reset_on_restart_success: Self::default_reset_on_success(),
            request_timeout_seconds: None,
        }
    }
}

impl WatchdogConfig {
    fn default_threshold() -> u32 {
        DEFAULT_FAILURE_THRESHOLD
    }

    fn default_interval() -> u64 {
        DEFAULT_INTERVAL_SECS
    }

    fn default_reset_on_success() -> bool {
        true
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Identity settings with every required field present.
#[derive(Clone)]
pub struct LoginSettings<'a> {
    pub base_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub tenant_id: &'a str,
    /// Management base URL, used to build the token scope
    pub management_base_url: &'a str,
}

impl fmt::Debug for LoginSettings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("management_base_url", &self.management_base_url)
            .finish()
    }
}

impl LoginSettings<'_> {
    /// `<login>/<tenant>/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(self.tenant_id)
        )
    }

    /// `<management>/.default`
    pub fn scope(&self) -> String {
        format!(
            "{}{}",
            self.management_base_url.trim_end_matches('/'),
            DEFAULT_SCOPE_SUFFIX
        )
    }
}

/// Management settings with every required field present.
#[derive(Debug, Clone)]
pub struct ManagementSettings<'a> {
    pub base_url: &'a str,
    pub subscription_id: &'a str,
    pub resource_group: &'a str,
    pub app_service: &'a str,
    pub api_version: &'a str,
}

impl ManagementSettings<'_> {
    /// Restart endpoint for the configured App Service
    pub fn restart_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}/restart?api-version={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(self.subscription_id),
            urlencoding::encode(self.resource_group),
            urlencoding::encode(self.app_service),
            urlencoding::encode(self.api_version),
        )
    }
}

impl AppConfig {
    /// Load configuration from `path` and overlay the process environment.
    ///
    /// With `required = false` a missing file falls back to defaults, so a
    /// deployment driven purely by environment variables needs no file.
    pub fn load<P: AsRef<Path>>(path: P, required: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            AppConfig::default()
        } else {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let overrides: [(&str, &mut Option<String>); 9] = [
            (ENV_BASE_URL, &mut self.target.base_url),
            (ENV_LOGIN_BASE_URL, &mut self.login.base_url),
            (ENV_CLIENT_ID, &mut self.login.client_id),
            (ENV_CLIENT_SECRET, &mut self.login.client_secret),
            (ENV_TENANT_ID, &mut self.login.tenant_id),
            (ENV_MANAGEMENT_BASE_URL, &mut self.management.base_url),
            (ENV_SUBSCRIPTION_ID, &mut self.management.subscription_id),
            (ENV_RESOURCE_GROUP, &mut self.management.resource_group),
            (ENV_APP_SERVICE, &mut self.management.app_service),
        ];

        for (key, slot) in overrides {
            if let Some(value) = get(key) {
                *slot = Some(value);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "watchdog.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.watchdog.interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "watchdog.interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.watchdog.request_timeout_seconds == Some(0) {
            return Err(ConfigError::Validation(
                "watchdog.request_timeout_seconds must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity settings, or the list of missing keys
    pub fn login_settings(&self) -> Result<LoginSettings<'_>, MissingSettings> {
        let mut missing = Vec::new();
        let base_url = present(&self.login.base_url, ENV_LOGIN_BASE_URL, &mut missing);
        let client_id = present(&self.login.client_id, ENV_CLIENT_ID, &mut missing);
        let client_secret = present(&self.login.client_secret, ENV_CLIENT_SECRET, &mut missing);
        let tenant_id = present(&self.login.tenant_id, ENV_TENANT_ID, &mut missing);
        let management_base_url =
            present(&self.management.base_url, ENV_MANAGEMENT_BASE_URL, &mut missing);

        match (base_url, client_id, client_secret, tenant_id, management_base_url) {
            (Some(base_url), Some(client_id), Some(client_secret), Some(tenant_id), Some(mgmt)) => {
                Ok(LoginSettings {
                    base_url,
                    client_id,
                    client_secret,
                    tenant_id,
                    management_base_url: mgmt,
                })
            }
            _ => Err(MissingSettings {
                section: "azure login",
                keys: missing,
            }),
        }
    }

    /// Management settings, or the list of missing keys
    pub fn management_settings(&self) -> Result<ManagementSettings<'_>, MissingSettings> {
        let mut missing = Vec::new();
        let base_url = present(&self.management.base_url, ENV_MANAGEMENT_BASE_URL, &mut missing);
        let subscription_id =
            present(&self.management.subscription_id, ENV_SUBSCRIPTION_ID, &mut missing);
        let resource_group =
            present(&self.management.resource_group, ENV_RESOURCE_GROUP, &mut missing);
        let app_service = present(&self.management.app_service, ENV_APP_SERVICE, &mut missing);

        match (base_url, subscription_id, resource_group, app_service) {
            (Some(base_url), Some(subscription_id), Some(resource_group), Some(app_service)) => {
                Ok(ManagementSettings {
                    base_url,
                    subscription_id,
                    resource_group,
                    app_service,
                    api_version: &self.management.api_version,
                })
            }
            _ => Err(MissingSettings {
                section: "azure management",
                keys: missing,
            }),
        }
    }
}

fn present<'a>(
    value: &'a Option<String>,
    key: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            missing.push(key);
            None
        }
    }
}

/// Required settings absent for a code path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing {section} settings: {}", .keys.join(", "))]
pub struct MissingSettings {
    pub section: &'static str,
    pub keys: Vec<&'static str>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
