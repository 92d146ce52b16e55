//! Configuration loading from an optional TOML file and the environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{RawConfig, WatchdogConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the optional TOML file.
pub const CONFIG_FILE_ENV: &str = "WATCHDOG_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key}={value:?}: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Key/value source the configuration is resolved from.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }
}

/// Resolve the watchdog configuration: defaults, then the file named by
/// `WATCHDOG_CONFIG` (if any), then environment overrides.
pub fn resolve(env: &impl EnvSource) -> Result<WatchdogConfig, ConfigError> {
    let mut raw = match lookup(env, CONFIG_FILE_ENV) {
        Some(path) => load_file(Path::new(&path))?,
        None => RawConfig::default(),
    };
    apply_env(&mut raw, env)?;
    validate_config(&raw).map_err(ConfigError::Validation)
}

/// Parse a TOML configuration file without validating it.
pub fn load_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables onto `raw`. Unset or blank variables leave
/// the file value (or default) in place.
pub fn apply_env(raw: &mut RawConfig, env: &impl EnvSource) -> Result<(), ConfigError> {
    let w = &mut raw.watchdog;
    override_parsed(env, "WATCHDOG_ROLE", &mut w.role)?;
    override_string(env, "PEER_HEALTH_URL", &mut w.peer_url);
    override_string(env, "WATCHDOG_PEER_URL", &mut w.peer_url);
    override_parsed(env, "WATCHDOG_HEALTH_PORT", &mut w.health_port)?;
    override_string(env, "WATCHDOG_HEALTH_BIND", &mut w.health_bind);
    override_parsed(env, "CHECK_EVERY", &mut w.check_every)?;
    override_parsed(env, "REQ_TIMEOUT", &mut w.request_timeout)?;
    override_parsed(env, "DEFER_SECONDS", &mut w.defer_seconds)?;
    override_parsed(env, "PEER_FAILURE_THRESHOLD", &mut w.peer_failure_threshold)?;

    let b = &mut raw.backoff;
    override_parsed(env, "BACKOFF_MIN", &mut b.min)?;
    override_parsed(env, "BACKOFF_MAX", &mut b.max)?;
    override_parsed(env, "BACKOFF_JITTER", &mut b.jitter)?;

    let s = &mut raw.service;
    override_string(env, "SERVICE_NAME", &mut s.name);
    override_parsed(env, "SERVICE_PORT", &mut s.port)?;
    override_string(env, "SERVICE_URL", &mut s.url);
    override_parsed(env, "SERVICE_CHECK", &mut s.check)?;
    override_string(env, "SERVICE_START_CMD", &mut s.start_command);
    override_parsed(env, "SERVICE_CLEAR_PORT", &mut s.clear_port)?;
    override_parsed(env, "SERVICE_OUTPUT", &mut s.output)?;
    override_parsed(env, "SERVICE_FAILURE_THRESHOLD", &mut s.failure_threshold)?;

    override_parsed(env, "WATCHDOG_LOG", &mut raw.logging.format)?;
    override_string(env, "RUST_LOG", &mut raw.logging.filter);
    override_string(env, "WATCHDOG_METRICS_ADDR", &mut raw.metrics.address);

    Ok(())
}

fn lookup(env: &impl EnvSource, key: &str) -> Option<String> {
    env.var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_string(env: &impl EnvSource, key: &str, slot: &mut Option<String>) {
    if let Some(value) = lookup(env, key) {
        *slot = Some(value);
    }
}

fn override_parsed<T>(
    env: &impl EnvSource,
    key: &'static str,
    slot: &mut Option<T>,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(env, key) {
        match value.parse::<T>() {
            Ok(parsed) => *slot = Some(parsed),
            Err(e) => {
                return Err(ConfigError::Env {
                    key,
                    reason: e.to_string(),
                    value,
                })
            }
        }
    }
    Ok(())
}
