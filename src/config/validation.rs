//! Configuration validation.
//!
//! # Responsibilities
//! - Fill defaults for every optional tunable
//! - Reject absent role / peer URL (no safe default exists for either)
//! - Validate value ranges (durations > 0, backoff bounds ordered, ports valid)
//! - Enforce the pair invariant: a primary never defers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: `&RawConfig → Result<WatchdogConfig, Vec<ValidationError>>`
//! - Runs before the watchdog starts; any error is fatal

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::*;

/// A single semantic problem in the supplied configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ValidationError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Validate a raw configuration and resolve it into a [`WatchdogConfig`].
pub fn validate_config(raw: &RawConfig) -> Result<WatchdogConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let role = raw.watchdog.role;
    if role.is_none() {
        errors.push(ValidationError::Missing { key: "WATCHDOG_ROLE" });
    }

    let peer_health_url = match raw.watchdog.peer_url.as_deref() {
        None => {
            errors.push(ValidationError::Missing { key: "WATCHDOG_PEER_URL" });
            None
        }
        Some(s) => http_url("WATCHDOG_PEER_URL", s, &mut errors),
    };

    let health_port = raw.watchdog.health_port.unwrap_or(DEFAULT_HEALTH_PORT);
    if health_port == 0 {
        errors.push(ValidationError::invalid("WATCHDOG_HEALTH_PORT", "port must be in 1..=65535"));
    }

    let check_interval = seconds(
        "CHECK_EVERY",
        raw.watchdog.check_every.unwrap_or(DEFAULT_CHECK_EVERY_SECS),
        &mut errors,
    );
    let request_timeout = seconds(
        "REQ_TIMEOUT",
        raw.watchdog.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        &mut errors,
    );

    let defer = match (role, raw.watchdog.defer_seconds) {
        (Some(Role::Primary), Some(secs)) if secs > 0.0 => {
            errors.push(ValidationError::invalid(
                "DEFER_SECONDS",
                "a primary watchdog must not defer (only the secondary has a deferral window)",
            ));
            Duration::ZERO
        }
        (Some(Role::Primary), _) | (None, _) => Duration::ZERO,
        (Some(Role::Secondary), secs) => {
            let secs = secs.unwrap_or(DEFAULT_SECONDARY_DEFER_SECS);
            match Duration::try_from_secs_f64(secs) {
                Ok(d) => d,
                Err(_) => {
                    errors.push(ValidationError::invalid(
                        "DEFER_SECONDS",
                        format!("{} is not a non-negative number of seconds", secs),
                    ));
                    Duration::ZERO
                }
            }
        }
    };

    let backoff_min = seconds(
        "BACKOFF_MIN",
        raw.backoff.min.unwrap_or(DEFAULT_BACKOFF_MIN_SECS),
        &mut errors,
    );
    let backoff_max = seconds(
        "BACKOFF_MAX",
        raw.backoff.max.unwrap_or(DEFAULT_BACKOFF_MAX_SECS),
        &mut errors,
    );
    if backoff_min > backoff_max {
        errors.push(ValidationError::invalid(
            "BACKOFF_MIN",
            format!(
                "backoff minimum ({:?}) exceeds maximum ({:?})",
                backoff_min, backoff_max
            ),
        ));
    }
    let jitter = raw.backoff.jitter.unwrap_or(0.0);
    if !(0.0..=0.5).contains(&jitter) {
        errors.push(ValidationError::invalid("BACKOFF_JITTER", "jitter ratio must be within [0, 0.5]"));
    }

    let peer_failure_threshold = threshold(
        "PEER_FAILURE_THRESHOLD",
        raw.watchdog.peer_failure_threshold,
        &mut errors,
    );
    let service_failure_threshold = threshold(
        "SERVICE_FAILURE_THRESHOLD",
        raw.service.failure_threshold,
        &mut errors,
    );

    let service_url = match (raw.service.url.as_deref(), raw.service.port) {
        (Some(url), _) => http_url("SERVICE_URL", url, &mut errors),
        (None, Some(0)) => {
            errors.push(ValidationError::invalid("SERVICE_PORT", "port must be in 1..=65535"));
            None
        }
        (None, port) => {
            let port = port.unwrap_or(DEFAULT_SERVICE_PORT);
            http_url("SERVICE_PORT", &format!("http://127.0.0.1:{}/health", port), &mut errors)
        }
    };

    let start_command = raw
        .service
        .start_command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let metrics_address = match raw.metrics.address.as_deref() {
        None => None,
        Some(addr) => match addr.parse::<SocketAddr>() {
            Ok(a) => Some(a),
            Err(e) => {
                errors.push(ValidationError::invalid("WATCHDOG_METRICS_ADDR", e.to_string()));
                None
            }
        },
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    // Every `None` above pushed an error, so these are all present here.
    let (Some(role), Some(peer_health_url), Some(service_url)) = (role, peer_health_url, service_url)
    else {
        return Err(errors);
    };

    Ok(WatchdogConfig {
        role,
        health: HealthListenerConfig {
            bind_host: raw
                .watchdog
                .health_bind
                .clone()
                .unwrap_or_else(|| DEFAULT_HEALTH_BIND.to_string()),
            port: health_port,
        },
        peer_health_url,
        service: ServiceConfig {
            name: raw
                .service
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            target: ServiceTarget {
                url: service_url,
                check: raw.service.check.unwrap_or_default(),
            },
            start_command,
            clear_port: raw.service.clear_port.unwrap_or(true),
            output: raw.service.output.unwrap_or_default(),
            failure_threshold: service_failure_threshold,
        },
        timing: TimingConfig {
            check_interval,
            request_timeout,
            defer,
        },
        backoff: BackoffConfig {
            min: backoff_min,
            max: backoff_max,
            jitter,
        },
        peer_failure_threshold,
        logging: LoggingConfig {
            format: raw.logging.format.unwrap_or_default(),
            filter: raw
                .logging
                .filter
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        },
        metrics: MetricsConfig {
            address: metrics_address,
        },
    })
}

fn seconds(key: &'static str, secs: f64, errors: &mut Vec<ValidationError>) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => d,
        _ => {
            errors.push(ValidationError::invalid(
                key,
                format!("{} is not a positive number of seconds", secs),
            ));
            Duration::ZERO
        }
    }
}

fn threshold(key: &'static str, value: Option<u32>, errors: &mut Vec<ValidationError>) -> u32 {
    match value {
        Some(0) => {
            errors.push(ValidationError::invalid(key, "threshold must be at least 1"));
            1
        }
        Some(n) => n,
        None => 1,
    }
}

fn http_url(key: &'static str, raw: &str, errors: &mut Vec<ValidationError>) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) if url.scheme() == "http" && url.host_str().is_some() => Some(url),
        Ok(url) => {
            errors.push(ValidationError::invalid(
                key,
                format!("'{}' must be an http:// URL with a host", url),
            ));
            None
        }
        Err(e) => {
            errors.push(ValidationError::invalid(key, format!("'{}': {}", raw, e)));
            None
        }
    }
}
