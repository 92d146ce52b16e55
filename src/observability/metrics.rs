//! Metrics collection and exposition.
//!
//! # Metrics
//! - `watchdog_probe_total` (counter): probes by target and outcome
//! - `watchdog_probe_latency_seconds` (histogram): probe latency by target
//! - `watchdog_restarts_total` (counter): restart actions by result
//! - `watchdog_phase` (gauge): numeric failover phase
//! - `watchdog_backoff_seconds` (gauge): current backoff delay
//! - `watchdog_peer_up` (gauge): 1=peer UP, 0=peer DOWN
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::failover::Phase;
use crate::health::probe::ProbeResult;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(result: &ProbeResult) {
    counter!(
        "watchdog_probe_total",
        "target" => result.target.as_str(),
        "outcome" => result.outcome.as_str()
    )
    .increment(1);
    histogram!("watchdog_probe_latency_seconds", "target" => result.target.as_str())
        .record(result.latency.as_secs_f64());
}

pub fn record_restart(ok: bool) {
    let result = if ok { "issued" } else { "failed" };
    counter!("watchdog_restarts_total", "result" => result).increment(1);
}

pub fn record_phase(phase: Phase) {
    gauge!("watchdog_phase").set(phase.code() as f64);
}

pub fn record_backoff(delay: Duration) {
    gauge!("watchdog_backoff_seconds").set(delay.as_secs_f64());
}

pub fn record_peer(up: bool) {
    gauge!("watchdog_peer_up").set(if up { 1.0 } else { 0.0 });
}
