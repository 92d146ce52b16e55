//! The watchdog cycle loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::WatchdogConfig;
use crate::control::ServiceControl;
use crate::failover::{Action, FailoverController, Phase};
use crate::health::probe::{HealthProbe, ProbeOutcome, ProbeTarget};
use crate::health::status::{HealthSnapshot, StatusBoard};
use crate::observability::metrics;

/// Shortest sleep between cycles when a deadline is due.
const MIN_SLEEP: Duration = Duration::from_millis(50);

/// What one cycle observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub service: ProbeOutcome,
    pub peer: ProbeOutcome,
    pub phase: Phase,
    pub restart_issued: bool,
    pub restart_failed: bool,
}

/// Drives probe → decide → act → publish, one cycle at a time.
pub struct Watchdog {
    service_target: ProbeTarget,
    peer_target: ProbeTarget,
    check_interval: Duration,
    request_timeout: Duration,
    probe: Arc<dyn HealthProbe>,
    control: Arc<dyn ServiceControl>,
    controller: FailoverController,
    board: Arc<StatusBoard>,
    cycles: u64,
}

impl Watchdog {
    pub fn new(
        config: &WatchdogConfig,
        probe: Arc<dyn HealthProbe>,
        control: Arc<dyn ServiceControl>,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            service_target: ProbeTarget::service(&config.service.target),
            peer_target: ProbeTarget::peer(config.peer_health_url.clone()),
            check_interval: config.timing.check_interval,
            request_timeout: config.timing.request_timeout,
            probe,
            control,
            controller: FailoverController::from_config(config),
            board,
            cycles: 0,
        }
    }

    pub fn controller(&self) -> &FailoverController {
        &self.controller
    }

    /// Run one full cycle. Never fails: every error becomes a state transition.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let (service, peer) = tokio::join!(
            self.probe.check(&self.service_target, self.request_timeout),
            self.probe.check(&self.peer_target, self.request_timeout),
        );

        let action = self.controller.observe(&service, Some(&peer), Instant::now());

        let mut restart_failed = false;
        if action == Action::Restart {
            match self.control.restart().await {
                Ok(()) => metrics::record_restart(true),
                Err(e) => {
                    tracing::error!(error = %e, "Restart action failed, treating service as still DOWN");
                    metrics::record_restart(false);
                    self.controller.restart_failed(Instant::now());
                    restart_failed = true;
                }
            }
        }

        self.cycles += 1;
        self.board.publish(HealthSnapshot::from_state(
            self.controller.state(),
            service.is_up(),
            self.cycles,
            Instant::now(),
        ));

        CycleReport {
            service: service.outcome,
            peer: peer.outcome,
            phase: self.controller.phase(),
            restart_issued: action == Action::Restart,
            restart_failed,
        }
    }

    /// How long to sleep before the next cycle: the check interval, cut short
    /// when a defer or backoff deadline falls inside it.
    pub fn next_sleep(&self, now: Instant) -> Duration {
        match self.controller.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(now)
                .clamp(MIN_SLEEP, self.check_interval.max(MIN_SLEEP)),
            None => self.check_interval,
        }
    }

    /// Loop until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            role = %self.controller.role(),
            service = %self.service_target.url,
            peer = %self.peer_target.url,
            interval_ms = self.check_interval.as_millis() as u64,
            "Watchdog loop starting"
        );

        loop {
            let report = self.run_cycle().await;
            tracing::debug!(
                service = %report.service,
                peer = %report.peer,
                phase = %report.phase,
                restart_issued = report.restart_issued,
                "Cycle complete"
            );

            let pause = self.next_sleep(Instant::now());
            tokio::select! {
                _ = time::sleep(pause) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Watchdog loop received shutdown signal, exiting");
                    break;
                }
            }
        }
    }
}
