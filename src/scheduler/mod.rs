//! Watchdog scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! every CHECK_EVERY (or sooner when a deadline is due):
//!     probe service ┐
//!                   ├─▶ FailoverController::observe ─▶ restart? ─▶ publish snapshot
//!     probe peer ───┘
//! ```
//!
//! # Design Decisions
//! - Both probes of a cycle run concurrently, each bounded by REQ_TIMEOUT
//! - Exactly one task owns the controller; the endpoint only reads snapshots

pub mod runner;

pub use runner::{CycleReport, Watchdog};
