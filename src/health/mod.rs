//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound (probe.rs):
//!     scheduler cycle
//!     → probe service target and peer /health, bounded by REQ_TIMEOUT
//!     → ProbeResult (UP / DOWN / TIMEOUT / ERROR)
//!
//! Inbound (endpoint.rs):
//!     GET /health from peer or tooling
//!     → status.rs snapshot (written once per cycle)
//!     → 200 UP, or 503 DOWN when the loop is stale
//! ```
//!
//! # Design Decisions
//! - TIMEOUT and ERROR count as DOWN for decisions, stay distinct in logs
//! - The endpoint reports the watchdog's own liveness, not the service's

pub mod endpoint;
pub mod probe;
pub mod status;
pub mod summary;

pub use endpoint::HealthServer;
pub use probe::{HealthProbe, HttpProber, ProbeOutcome, ProbeResult, ProbeTarget, TargetKind};
pub use status::{HealthReport, HealthSnapshot, HealthStatus, Identity, StatusBoard};
