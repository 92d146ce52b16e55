//! Structured logging.
//!
//! The tracing subscriber is the watchdog's log sink. `pretty` and `json`
//! attach a fmt layer on stderr; `off` attaches none, which is how the silent
//! launch variant runs.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::DEFAULT_LOG_FILTER;
use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|e| {
        eprintln!(
            "invalid log filter {:?} ({}), falling back to {:?}",
            config.filter, e, DEFAULT_LOG_FILTER
        );
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let pretty = (config.format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
}
