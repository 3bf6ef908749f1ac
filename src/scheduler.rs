//! Periodic trigger driving the watchdog.
//!
//! Ticks fire on a fixed interval, the first one immediately. Each tick runs
//! in its own task and is awaited before the next one starts, so a panic in
//! one tick is logged and the loop carries on.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use crate::watchdog::{TickReport, Watchdog};

/// Run ticks every `interval` until `shutdown` resolves.
///
/// A tick already in progress when shutdown fires is allowed to finish.
pub async fn run<F>(watchdog: Watchdog, interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let tick = move || {
        let watchdog = watchdog.clone();
        async move { watchdog.tick().await }
    };
    run_loop(tick, interval, shutdown).await;
}

async fn run_loop<T, Fut, F>(mut tick: T, interval: Duration, shutdown: F)
where
    T: FnMut() -> Fut,
    Fut: Future<Output = TickReport> + Send + 'static,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::info!(interval_secs = interval.as_secs(), "Watchdog started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                spawn_tick(tick()).await;
            }
        }
    }

    tracing::info!("Watchdog stopped");
}

/// Run one tick in a separate task, absorbing panics.
pub async fn run_guarded(watchdog: &Watchdog) -> Option<TickReport> {
    let watchdog = watchdog.clone();
    spawn_tick(async move { watchdog.tick().await }).await
}

async fn spawn_tick<Fut>(tick: Fut) -> Option<TickReport>
where
    Fut: Future<Output = TickReport> + Send + 'static,
{
    match tokio::spawn(tick).await {
        Ok(report) => {
            tracing::debug!(executed_at = %Utc::now(), "Timer trigger executed");
            Some(report)
        }
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(error = %message, "Tick panicked");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Tick task failed");
            None
        }
    }
}
