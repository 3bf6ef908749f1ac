//! Healthwatch: a health-monitoring watchdog.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from an optional TOML file plus environment variables,
//! builds the watchdog, and runs it on a fixed interval until SIGINT/SIGTERM.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use healthwatch::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use healthwatch::{http, scheduler, AppError, Watchdog};

/// Healthwatch: probe a service and restart it when it stays unhealthy
#[derive(Parser, Debug)]
#[command(name = "healthwatch", version, about)]
struct Args {
    /// Path to configuration file (optional unless given explicitly)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "healthwatch=debug")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single tick, print its report as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before tracing so the log format is known
    let (config_path, required) = match &args.config {
        Some(path) => (path.as_str(), true),
        None => (DEFAULT_CONFIG_PATH, false),
    };
    let config = AppConfig::load(config_path, required)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        target_url = ?config.target.probe_url(),
        threshold = config.watchdog.failure_threshold,
        interval_secs = config.watchdog.interval_seconds,
        reset_on_restart_success = config.watchdog.reset_on_restart_success,
        "Loaded configuration"
    );
    if config.target.base_url.is_none() {
        tracing::warn!("BaseURL is not set; ticks will skip probing");
    }

    let interval = Duration::from_secs(config.watchdog.interval_seconds);
    let watchdog = Watchdog::new(config)?;

    if args.once {
        let report = watchdog.tick().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    scheduler::run(watchdog, interval, http::shutdown_signal()).await;

    Ok(())
}
