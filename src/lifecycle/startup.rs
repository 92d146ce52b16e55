//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics when an exporter address is configured
//! - Bind the health listener (fatal on failure)
//! - Start the health endpoint, then the cycle loop
//! - Wait for both to finish after shutdown
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Logging is initialized by the caller, before configuration errors
//!   can be reported through it

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::WatchdogConfig;
use crate::control::{CommandControl, ServiceControl};
use crate::health::{HealthProbe, HealthServer, HttpProber, Identity, StatusBoard};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::scheduler::Watchdog;

/// Fatal startup and runtime errors.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot bind health endpoint on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("health endpoint failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the watchdog with the production prober and service control until
/// SIGINT/SIGTERM.
pub async fn run(config: WatchdogConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    tokio::spawn(signals::wait_for_signal(shutdown.clone()));

    let control = CommandControl::from_config(&config.service, config.timing.request_timeout);
    run_with(config, Arc::new(HttpProber::new()), Arc::new(control), shutdown).await
}

/// Run with injected probe and control until `shutdown` fires.
pub async fn run_with(
    config: WatchdogConfig,
    probe: Arc<dyn HealthProbe>,
    control: Arc<dyn ServiceControl>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let address = config.health.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    serve(config, listener, probe, control, shutdown).await
}

/// Run on an already-bound health listener until `shutdown` fires.
pub async fn serve(
    config: WatchdogConfig,
    listener: TcpListener,
    probe: Arc<dyn HealthProbe>,
    control: Arc<dyn ServiceControl>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let identity = Identity::from_config(&config);
    tracing::info!(
        role = %identity.role,
        pid = identity.pid,
        instance_id = %identity.instance_id,
        service = %identity.service,
        service_target = %identity.service_target,
        peer = %config.peer_health_url,
        defer_secs = config.defer_window().as_secs_f64(),
        backoff_min_secs = config.backoff.min.as_secs_f64(),
        backoff_max_secs = config.backoff.max.as_secs_f64(),
        "pair-watchdog starting"
    );
    if config.timing.request_timeout >= config.timing.check_interval {
        tracing::warn!(
            request_timeout_ms = config.timing.request_timeout.as_millis() as u64,
            check_interval_ms = config.timing.check_interval.as_millis() as u64,
            "Probe timeout is not shorter than the check interval; cycles may run back to back"
        );
    }

    if let Some(addr) = config.metrics.address {
        metrics::init_metrics(addr);
    }

    let board = Arc::new(StatusBoard::new(identity, config.timing.check_interval));

    let server = HealthServer::new(board.clone(), config.timing.request_timeout);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let watchdog = Watchdog::new(&config, probe, control, board);
    let loop_task = tokio::spawn(watchdog.run(shutdown.subscribe()));

    let served = match server_task.await {
        Ok(result) => result.map_err(StartupError::Serve),
        Err(e) => {
            tracing::error!(error = %e, "Health endpoint task panicked");
            Ok(())
        }
    };

    // The endpoint only stops on shutdown or failure; either way the loop follows.
    shutdown.trigger();
    if let Err(e) = loop_task.await {
        tracing::error!(error = %e, "Watchdog loop task panicked");
    }

    tracing::info!("Shutdown complete");
    served
}
