//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Restart attempt did not bring the service back:
//!     → failover controller enters BACKOFF_WAIT
//!     → backoff.rs (next delay, doubled and clamped to [min, max])
//!     → scheduler wakes no later than the backoff deadline
//! ```
//!
//! # Design Decisions
//! - Deterministic by default; jitter is opt-in
//! - Delay resets to the minimum as soon as the service is seen UP
//! - Probe timeouts are enforced at the call site (health::probe), not here

pub mod backoff;

pub use backoff::BackoffPolicy;
