//! Watchdog lifecycle phases and the mutable state the controller owns.
//!
//! # States
//! - Healthy: service UP (peer UP or unknown)
//! - ServiceSuspect: service DOWN, consecutive failures below threshold
//! - Deferring: secondary only, service confirmed DOWN, defer window open
//! - Restarting: restart issued, next probe decides
//! - BackoffWait: restart did not help, waiting out the backoff delay
//!
//! # State Transitions
//! ```text
//! Healthy → ServiceSuspect: service probe not UP
//! ServiceSuspect → Restarting: threshold reached (primary)
//! ServiceSuspect → Deferring: threshold reached (secondary)
//! Deferring → Restarting: defer deadline passed, or peer DOWN
//! Restarting → BackoffWait: still DOWN on the next probe (or restart action failed)
//! BackoffWait → Restarting: backoff deadline passed
//! any → Healthy: service probe UP
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Healthy,
    ServiceSuspect,
    Deferring,
    Restarting,
    BackoffWait,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Healthy => "HEALTHY",
            Phase::ServiceSuspect => "SERVICE_SUSPECT",
            Phase::Deferring => "DEFERRING",
            Phase::Restarting => "RESTARTING",
            Phase::BackoffWait => "BACKOFF_WAIT",
        }
    }

    /// Numeric code exported as the `watchdog_phase` gauge.
    pub fn code(&self) -> u8 {
        match self {
            Phase::Healthy => 0,
            Phase::ServiceSuspect => 1,
            Phase::Deferring => 2,
            Phase::Restarting => 3,
            Phase::BackoffWait => 4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-lived mutable state. Created fresh at process start, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogState {
    pub phase: Phase,
    pub consecutive_service_failures: u32,
    pub consecutive_peer_failures: u32,
    /// Last peer verdict; `None` until the first peer probe.
    pub peer_up: Option<bool>,
    /// Delay of the current (or next) backoff wait.
    pub current_backoff_delay: Duration,
    /// Failed restart attempts in the current outage.
    pub failed_restarts: u32,
    pub backoff_until: Option<Instant>,
    pub last_restart_attempt_at: Option<Instant>,
    pub defer_deadline: Option<Instant>,
    /// Restarts issued since process start.
    pub restarts_issued: u64,
}

impl WatchdogState {
    pub fn new(backoff_min: Duration) -> Self {
        Self {
            phase: Phase::Healthy,
            consecutive_service_failures: 0,
            consecutive_peer_failures: 0,
            peer_up: None,
            current_backoff_delay: backoff_min,
            failed_restarts: 0,
            backoff_until: None,
            last_restart_attempt_at: None,
            defer_deadline: None,
            restarts_issued: 0,
        }
    }
}
