//! Healthwatch - probe a service and restart it when it stays down
//!
//! A scheduled watchdog that probes a liveness endpoint, counts consecutive
//! failures, and once a threshold is crossed obtains an Azure AD token and
//! restarts the App Service through the management API.

pub mod config;
pub mod error;
pub mod http;
pub mod probe;
pub mod remediation;
pub mod scheduler;
pub mod state;
pub mod watchdog;

pub use config::AppConfig;
pub use error::*;
pub use watchdog::{TickReport, Watchdog};
