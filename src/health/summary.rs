//! Operator view of a deployment: query `/health` URLs and summarize.
//!
//! Backs the `watchdog-cli` binary. A target is UP when it answers 2xx and
//! its body does not say `"healthy": false`.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::health::probe::reports_unhealthy;

/// Result of one `/health` query.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub url: String,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub all_up: bool,
    pub targets: Vec<TargetStatus>,
}

impl StatusSummary {
    /// Process exit status: 0 when every target is UP, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.all_up {
            0
        } else {
            1
        }
    }
}

/// Query a single target.
pub async fn check_target(client: &reqwest::Client, name: &str, url: &str) -> TargetStatus {
    let started = Instant::now();
    match client.get(url).send().await {
        Ok(res) => {
            let status = res.status();
            let bytes = res.bytes().await.unwrap_or_default();
            let body = serde_json::from_slice::<Value>(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            TargetStatus {
                name: name.to_string(),
                url: url.to_string(),
                up: status.is_success() && !reports_unhealthy(&bytes),
                status_code: Some(status.as_u16()),
                latency_ms: started.elapsed().as_millis() as u64,
                body: Some(body),
                error: None,
            }
        }
        Err(e) => TargetStatus {
            name: name.to_string(),
            url: url.to_string(),
            up: false,
            status_code: None,
            latency_ms: started.elapsed().as_millis() as u64,
            body: None,
            error: Some(if e.is_timeout() { "timeout".to_string() } else { e.to_string() }),
        },
    }
}

/// Query every `(name, url)` target concurrently; results keep input order.
pub async fn check_all(client: &reqwest::Client, targets: Vec<(String, String)>) -> StatusSummary {
    let handles: Vec<_> = targets
        .into_iter()
        .map(|(name, url)| {
            let client = client.clone();
            tokio::spawn(async move { check_target(&client, &name, &url).await })
        })
        .collect();

    let expected = handles.len();
    let mut results = Vec::with_capacity(expected);
    for handle in handles {
        match handle.await {
            Ok(status) => results.push(status),
            Err(e) => tracing::error!(error = %e, "Status check task failed"),
        }
    }

    // A lost task counts against the deployment.
    let complete = results.len() == expected;
    StatusSummary {
        all_up: complete && results.iter().all(|t| t.up),
        targets: results,
    }
}

/// Parse a positive, finite timeout in seconds.
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.trim().parse::<f64>().map_err(|e| e.to_string())?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("{} is not a positive number of seconds", s)),
    }
}
