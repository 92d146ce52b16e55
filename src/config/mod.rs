//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file named by WATCHDOG_CONFIG (loader.rs)
//!     → environment overrides, the launcher's surface (loader.rs)
//!     → validation.rs (required keys, ranges, pair invariant)
//!     → WatchdogConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; there is no hot reload
//! - Role and peer URL have no default: their absence is fatal at startup
//! - Every numeric tunable has a documented default

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{resolve, ConfigError, EnvSource, ProcessEnv};
pub use schema::{
    BackoffConfig, CheckKind, LogFormat, LoggingConfig, Role, ServiceConfig, ServiceOutput,
    ServiceTarget, TimingConfig, WatchdogConfig,
};
pub use validation::ValidationError;
