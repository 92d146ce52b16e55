//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Logging → Metrics → Bind /health → Start endpoint → Start cycle loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Endpoint drains, cycle loop exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a health port that cannot be bound is fatal
//! - The endpoint is up before the first cycle runs
//! - Terminating the watchdog never touches the supervised service

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
