//! Supervised-service control interface.
//!
//! # Responsibilities
//! - `restart()`: fire-and-forget (re)start of the supervised service
//!
//! # Design Decisions
//! - The result of a restart is judged by the next service probe, never by
//!   the return value here; an `Err` only means the action could not be issued
//! - There is deliberately no operation aimed at the peer watchdog

pub mod command;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use command::CommandControl;

/// Errors issuing a restart. Always transient for the watchdog.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no start command configured for service '{0}'")]
    NotConfigured(String),

    #[error("failed to spawn start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("restart action timed out after {0:?}")]
    Timeout(Duration),
}

/// Start/restart operations on the supervised service.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn restart(&self) -> Result<(), ControlError>;
}
