//! Liveness probes for the peer watchdog and the supervised service.
//!
//! # Responsibilities
//! - One bounded-time check per call: `check(target, timeout) → ProbeResult`
//! - Classify the outcome: UP, DOWN, TIMEOUT or ERROR
//!
//! # Design Decisions
//! - `timeout` covers connect, response headers and body; past it the call is
//!   abandoned and classified TIMEOUT
//! - No retries here; retry cadence belongs to the scheduler and backoff
//! - A 2xx answer whose JSON body says `"healthy": false` is DOWN; a 2xx
//!   whose body cannot be read within 64 KiB stays UP
//! - Probes are read-only: nothing here can command the peer

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use url::Url;

use crate::config::{CheckKind, ServiceTarget};
use crate::observability::metrics;

const USER_AGENT: &str = concat!("pair-watchdog/", env!("CARGO_PKG_VERSION"));
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Which side of the pair a probe looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Peer,
    Service,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Peer => "peer",
            TargetKind::Service => "service",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub kind: TargetKind,
    pub url: Url,
    pub check: CheckKind,
}

impl ProbeTarget {
    /// The peer watchdog's `/health`; always an HTTP GET.
    pub fn peer(url: Url) -> Self {
        Self {
            kind: TargetKind::Peer,
            url,
            check: CheckKind::Http,
        }
    }

    pub fn service(target: &ServiceTarget) -> Self {
        Self {
            kind: TargetKind::Service,
            url: target.url.clone(),
            check: target.check,
        }
    }
}

/// Classified result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeOutcome {
    /// Reachable and healthy.
    Up,
    /// Reachable but unhealthy.
    Down,
    /// No answer within the request timeout.
    Timeout,
    /// Any other transport failure.
    Error,
}

impl ProbeOutcome {
    pub fn is_up(self) -> bool {
        self == ProbeOutcome::Up
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Up => "UP",
            ProbeOutcome::Down => "DOWN",
            ProbeOutcome::Timeout => "TIMEOUT",
            ProbeOutcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced fresh each cycle and discarded once the controller has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub target: TargetKind,
    pub observed_at: Instant,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
    /// Human-readable reason for non-UP outcomes.
    pub detail: Option<String>,
}

impl ProbeResult {
    pub fn new(target: TargetKind, outcome: ProbeOutcome, observed_at: Instant) -> Self {
        Self {
            target,
            observed_at,
            outcome,
            latency: Duration::ZERO,
            detail: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.outcome.is_up()
    }
}

/// Bounded-time liveness check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, target: &ProbeTarget, timeout: Duration) -> ProbeResult;
}

/// HTTP / TCP prober backed by a non-pooling hyper client.
pub struct HttpProber {
    client: Client<HttpConnector, Body>,
}

impl HttpProber {
    pub fn new() -> Self {
        // Fresh connection per probe so a dead listener is noticed immediately.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        Self { client }
    }

    async fn http_check(&self, url: &Url) -> (ProbeOutcome, Option<String>) {
        let request = match Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("user-agent", USER_AGENT)
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return (ProbeOutcome::Error, Some(format!("invalid request: {}", e))),
        };

        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => return (ProbeOutcome::Error, Some(describe(&e))),
        };

        let status = response.status();
        if !status.is_success() {
            return (ProbeOutcome::Down, Some(format!("status {}", status)));
        }

        match axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES).await {
            Ok(body) if reports_unhealthy(&body) => {
                (ProbeOutcome::Down, Some("body reports healthy=false".to_string()))
            }
            Ok(_) => (ProbeOutcome::Up, None),
            // 2xx with an oversized or cut-off body: the `healthy` flag is unknown.
            Err(e) => (ProbeOutcome::Up, Some(format!("body not inspected: {}", e))),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn check(&self, target: &ProbeTarget, timeout: Duration) -> ProbeResult {
        let started = Instant::now();

        let attempt = async {
            match target.check {
                CheckKind::Http => self.http_check(&target.url).await,
                CheckKind::Tcp => tcp_check(&target.url).await,
            }
        };

        let (outcome, detail) = match time::timeout(timeout, attempt).await {
            Ok(verdict) => verdict,
            Err(_) => (
                ProbeOutcome::Timeout,
                Some(format!("no answer within {:?}", timeout)),
            ),
        };

        let result = ProbeResult {
            target: target.kind,
            observed_at: started,
            outcome,
            latency: started.elapsed(),
            detail,
        };

        tracing::debug!(
            target = %result.target,
            url = %target.url,
            outcome = %result.outcome,
            latency_ms = result.latency.as_millis() as u64,
            detail = result.detail.as_deref().unwrap_or(""),
            "Probe finished"
        );
        metrics::record_probe(&result);

        result
    }
}

async fn tcp_check(url: &Url) -> (ProbeOutcome, Option<String>) {
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return (ProbeOutcome::Error, Some(format!("no host/port in {}", url)));
    };

    match TcpStream::connect((host, port)).await {
        Ok(_) => (ProbeOutcome::Up, None),
        Err(e) => (ProbeOutcome::Error, Some(e.to_string())),
    }
}

/// True when a JSON body explicitly carries `"healthy": false`.
pub fn reports_unhealthy(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("healthy").and_then(|h| h.as_bool()))
        == Some(false)
}

fn describe(e: &hyper_util::client::legacy::Error) -> String {
    match std::error::Error::source(e) {
        Some(source) => format!("{}: {}", e, source),
        None => e.to_string(),
    }
}
