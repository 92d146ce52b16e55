//! pair-watchdog: mutual health watchdog with deferred failover.
//!
//! Configured through `WATCHDOG_*` environment variables and an optional
//! TOML file named by `WATCHDOG_CONFIG`.

use std::process::ExitCode;

use pair_watchdog::config::{self, ProcessEnv};
use pair_watchdog::lifecycle::startup;
use pair_watchdog::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match config::resolve(&ProcessEnv) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pair-watchdog: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("pair-watchdog: failed to initialize logging: {e}");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), role = %config.role, "Configuration loaded");

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("pair-watchdog: {e}");
            ExitCode::FAILURE
        }
    }
}
