//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler cycle
//!     → ProbeResult (service) + ProbeResult (peer)
//!     → controller.rs (advance state.rs, decide Action)
//!     → Action::Restart → control interface (fire-and-forget)
//!     → outcome judged only by the next service probe
//! ```
//!
//! # Design Decisions
//! - Role is static configuration: the primary acts at once, the secondary
//!   waits out its defer window unless the primary itself is DOWN
//! - Peer verdicts never trigger a restart of the peer; they only end deferral
//!   early and are exported for alerting
//! - "Service recovered" is checked before "peer DOWN": a healthy service is
//!   never restarted
//! - State lives in memory only; a watchdog restart resets every counter

pub mod controller;
pub mod state;

pub use controller::{Action, FailoverController};
pub use state::{Phase, WatchdogState};
