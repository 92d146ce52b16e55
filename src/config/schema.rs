//! Configuration schema definitions.
//!
//! Two shapes live here:
//! - [`RawConfig`]: the file/env shape. Every field is optional so a TOML file
//!   and the environment can each supply a subset.
//! - [`WatchdogConfig`]: the resolved, validated, immutable configuration the
//!   rest of the watchdog consumes.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// Static role of this instance within the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Secondary,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "1" => Ok(Role::Primary),
            "secondary" | "2" => Ok(Role::Secondary),
            other => Err(format!("expected 'primary' or 'secondary', got '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}

/// How the supervised service's liveness is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// GET the liveness URL, 2xx is healthy.
    #[default]
    Http,
    /// TCP connect only.
    Tcp,
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(CheckKind::Http),
            "tcp" => Ok(CheckKind::Tcp),
            other => Err(format!("expected 'http' or 'tcp', got '{}'", other)),
        }
    }
}

/// Where the started service's stdout/stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceOutput {
    #[default]
    Discard,
    Inherit,
}

impl FromStr for ServiceOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" | "null" | "silent" => Ok(ServiceOutput::Discard),
            "inherit" => Ok(ServiceOutput::Inherit),
            other => Err(format!("expected 'discard' or 'inherit', got '{}'", other)),
        }
    }
}

/// Log output format of the watchdog itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    /// No fmt layer at all.
    Off,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "off" | "none" | "silent" => Ok(LogFormat::Off),
            other => Err(format!("expected 'pretty', 'json' or 'off', got '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw (file + env) shape
// ---------------------------------------------------------------------------

/// Root of the TOML file; environment overrides are applied on top.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawConfig {
    pub watchdog: RawWatchdog,
    pub backoff: RawBackoff,
    pub service: RawService,
    pub logging: RawLogging,
    pub metrics: RawMetrics,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawWatchdog {
    pub role: Option<Role>,
    pub peer_url: Option<String>,
    pub health_port: Option<u16>,
    pub health_bind: Option<String>,
    /// Seconds.
    pub check_every: Option<f64>,
    /// Seconds.
    pub request_timeout: Option<f64>,
    /// Seconds.
    pub defer_seconds: Option<f64>,
    pub peer_failure_threshold: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawBackoff {
    /// Seconds.
    pub min: Option<f64>,
    /// Seconds.
    pub max: Option<f64>,
    /// Ratio of the delay, 0 disables.
    pub jitter: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawService {
    pub name: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub check: Option<CheckKind>,
    pub start_command: Option<String>,
    pub clear_port: Option<bool>,
    pub output: Option<ServiceOutput>,
    pub failure_threshold: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawLogging {
    pub format: Option<LogFormat>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RawMetrics {
    pub address: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved shape
// ---------------------------------------------------------------------------

pub const DEFAULT_HEALTH_PORT: u16 = 9050;
pub const DEFAULT_HEALTH_BIND: &str = "0.0.0.0";
pub const DEFAULT_SERVICE_PORT: u16 = 9051;
pub const DEFAULT_SERVICE_NAME: &str = "service";
pub const DEFAULT_CHECK_EVERY_SECS: f64 = 3.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 2.0;
pub const DEFAULT_BACKOFF_MIN_SECS: f64 = 1.0;
pub const DEFAULT_BACKOFF_MAX_SECS: f64 = 20.0;
pub const DEFAULT_SECONDARY_DEFER_SECS: f64 = 10.0;
pub const DEFAULT_LOG_FILTER: &str = "pair_watchdog=info";

/// Resolved watchdog configuration. Immutable after start.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub role: Role,
    /// Own `/health` listener.
    pub health: HealthListenerConfig,
    /// Peer watchdog's `/health` URL.
    pub peer_health_url: Url,
    pub service: ServiceConfig,
    pub timing: TimingConfig,
    pub backoff: BackoffConfig,
    /// Consecutive failed peer probes before the peer counts as DOWN.
    pub peer_failure_threshold: u32,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl WatchdogConfig {
    /// Defer window; always zero on the primary.
    pub fn defer_window(&self) -> Duration {
        match self.role {
            Role::Primary => Duration::ZERO,
            Role::Secondary => self.timing.defer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthListenerConfig {
    pub bind_host: String,
    pub port: u16,
}

impl HealthListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// The supervised service target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    /// Liveness URL (also used to derive the TCP address for `tcp` checks).
    pub url: Url,
    pub check: CheckKind,
}

impl ServiceTarget {
    /// Port the service listens on.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// Port that may be cleared before a restart: only an explicit port on a
    /// loopback, unspecified or `localhost` host.
    pub fn local_port(&self) -> Option<u16> {
        let local = match self.url.host()? {
            Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
            Host::Ipv4(ip) => ip.is_loopback() || ip.is_unspecified(),
            Host::Ipv6(ip) => ip.is_loopback() || ip.is_unspecified(),
        };
        if local {
            self.url.port()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Label used in logs and the health body (`hub`, `ui`, ...).
    pub name: String,
    pub target: ServiceTarget,
    /// Shell command that (re)starts the service.
    pub start_command: Option<String>,
    pub clear_port: bool,
    pub output: ServiceOutput,
    /// Consecutive DOWN probes before the controller acts.
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub check_interval: Duration,
    pub request_timeout: Duration,
    /// Secondary deferral window.
    pub defer: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs_f64(DEFAULT_BACKOFF_MIN_SECS),
            max: Duration::from_secs_f64(DEFAULT_BACKOFF_MAX_SECS),
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Prometheus exporter bind address; `None` disables the exporter.
    pub address: Option<SocketAddr>,
}
