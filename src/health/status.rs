//! Cached status the HealthEndpoint answers from.
//!
//! The scheduler publishes a fresh [`HealthSnapshot`] at the end of every
//! cycle; the endpoint only ever loads the latest one. The two sides share
//! nothing else, so the decision logic needs no locks.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{Role, WatchdogConfig};
use crate::failover::{Phase, WatchdogState};

/// Facts about this watchdog process that never change.
#[derive(Debug, Clone)]
pub struct Identity {
    pub role: Role,
    pub pid: u32,
    pub instance_id: Uuid,
    pub started_utc: DateTime<Utc>,
    pub service: String,
    pub service_target: String,
}

impl Identity {
    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self {
            role: config.role,
            pid: std::process::id(),
            instance_id: Uuid::new_v4(),
            started_utc: Utc::now(),
            service: config.service.name.clone(),
            service_target: config.service.target.url.to_string(),
        }
    }
}

/// State as of the end of the last completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    /// `None` until the first cycle completes.
    pub last_cycle_at: Option<Instant>,
    pub cycles: u64,
    pub phase: Phase,
    pub service_up: Option<bool>,
    pub peer_up: Option<bool>,
    pub consecutive_service_failures: u32,
    pub consecutive_peer_failures: u32,
    pub current_backoff: Duration,
    pub restarts_issued: u64,
}

impl HealthSnapshot {
    pub fn initial() -> Self {
        Self {
            last_cycle_at: None,
            cycles: 0,
            phase: Phase::Healthy,
            service_up: None,
            peer_up: None,
            consecutive_service_failures: 0,
            consecutive_peer_failures: 0,
            current_backoff: Duration::ZERO,
            restarts_issued: 0,
        }
    }

    pub fn from_state(state: &WatchdogState, service_up: bool, cycles: u64, at: Instant) -> Self {
        Self {
            last_cycle_at: Some(at),
            cycles,
            phase: state.phase,
            service_up: Some(service_up),
            peer_up: state.peer_up,
            consecutive_service_failures: state.consecutive_service_failures,
            consecutive_peer_failures: state.consecutive_peer_failures,
            current_backoff: state.current_backoff_delay,
            restarts_issued: state.restarts_issued,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub healthy: bool,
    pub role: Role,
    pub pid: u32,
    pub instance_id: Uuid,
    pub started_utc: DateTime<Utc>,
    pub service: String,
    pub service_target: String,
    pub phase: Phase,
    pub cycles: u64,
    /// Milliseconds since the last completed cycle (or since start).
    pub last_cycle_age_ms: u64,
    pub service_up: Option<bool>,
    pub peer_up: Option<bool>,
    pub consecutive_service_failures: u32,
    pub restarts_issued: u64,
    pub backoff_ms: u64,
}

/// Shared between the scheduler (writer) and the health endpoint (reader).
pub struct StatusBoard {
    identity: Identity,
    started_at: Instant,
    stale_after: Duration,
    snapshot: ArcSwap<HealthSnapshot>,
}

impl StatusBoard {
    /// `check_interval` sets the self-staleness guard at twice its length.
    pub fn new(identity: Identity, check_interval: Duration) -> Self {
        Self {
            identity,
            started_at: Instant::now(),
            stale_after: check_interval.saturating_mul(2),
            snapshot: ArcSwap::from_pointee(HealthSnapshot::initial()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Atomically replace the snapshot.
    pub fn publish(&self, snapshot: HealthSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    /// Build the report as of `now`. DOWN when no cycle has completed within
    /// the staleness window, whatever the last recorded service state was.
    pub fn report(&self, now: Instant) -> HealthReport {
        let snapshot = self.snapshot.load();
        let reference = snapshot.last_cycle_at.unwrap_or(self.started_at);
        let age = now.saturating_duration_since(reference);
        let healthy = age <= self.stale_after;

        HealthReport {
            status: if healthy { HealthStatus::Up } else { HealthStatus::Down },
            healthy,
            role: self.identity.role,
            pid: self.identity.pid,
            instance_id: self.identity.instance_id,
            started_utc: self.identity.started_utc,
            service: self.identity.service.clone(),
            service_target: self.identity.service_target.clone(),
            phase: snapshot.phase,
            cycles: snapshot.cycles,
            last_cycle_age_ms: age.as_millis() as u64,
            service_up: snapshot.service_up,
            peer_up: snapshot.peer_up,
            consecutive_service_failures: snapshot.consecutive_service_failures,
            restarts_issued: snapshot.restarts_issued,
            backoff_ms: snapshot.current_backoff.as_millis() as u64,
        }
    }
}
