//! Pair watchdog library.
//!
//! Two symmetric watchdogs, PRIMARY and SECONDARY, each supervise the same
//! service and each other. The PRIMARY restarts a failed service at once;
//! the SECONDARY defers while the PRIMARY is alive so the two never race.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────── pair-watchdog ────────────────────────────┐
//!   │                                                                       │
//!   │  ┌──────────┐   probes   ┌────────────┐  Action   ┌──────────────┐    │
//!   │  │scheduler │──────────▶│  failover  │─────────▶│   control    │────┼──▶ service
//!   │  │  loop    │◀─────────│ controller │           │ (restart)    │    │
//!   │  └────┬─────┘  verdicts  └────────────┘           └──────────────┘    │
//!   │       │ publish                                                       │
//!   │       ▼                                                               │
//!   │  ┌──────────┐   GET /health   ◀───────────────────────────────────────┼── peer
//!   │  │  health  │                                                         │
//!   │  │ endpoint │                                                         │
//!   │  └──────────┘                                                         │
//!   │                                                                       │
//!   │  config · observability · resilience (backoff) · lifecycle            │
//!   └───────────────────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod failover;
pub mod health;
pub mod scheduler;

// Side effects
pub mod control;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{Role, WatchdogConfig};
pub use failover::{FailoverController, Phase};
pub use health::HealthServer;
pub use lifecycle::Shutdown;
pub use scheduler::Watchdog;
