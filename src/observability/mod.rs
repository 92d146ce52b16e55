//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! controller / probes / scheduler produce:
//!     → logging.rs (structured tracing events: phase changes, restarts, peer verdicts)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr (pretty or JSON), or nothing in the silent variant
//!     → Prometheus scrape, when WATCHDOG_METRICS_ADDR is set
//! ```

pub mod logging;
pub mod metrics;
