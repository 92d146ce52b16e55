//! Shell-command service control.
//!
//! Restart = optionally free the service port (SIGTERM whatever process
//! *listens* on it, per `lsof -sTCP:LISTEN`), let it settle, then spawn the
//! start command in its own process group and return without waiting for it.
//!
//! Clients connected to the port, the peer watchdog's probes among them, are
//! never signalled, and neither is this process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;

use crate::config::{ServiceConfig, ServiceOutput};
use crate::control::{ControlError, ServiceControl};

/// Pause between clearing the port and starting the service.
const CLEAR_SETTLE: Duration = Duration::from_millis(300);

pub struct CommandControl {
    service: String,
    start_command: Option<String>,
    clear_port: Option<u16>,
    output: ServiceOutput,
    timeout: Duration,
}

impl CommandControl {
    pub fn new(service: impl Into<String>, start_command: Option<String>, timeout: Duration) -> Self {
        Self {
            service: service.into(),
            start_command,
            clear_port: None,
            output: ServiceOutput::Discard,
            timeout,
        }
    }

    pub fn with_clear_port(mut self, port: Option<u16>) -> Self {
        self.clear_port = port;
        self
    }

    pub fn with_output(mut self, output: ServiceOutput) -> Self {
        self.output = output;
        self
    }

    pub fn from_config(config: &ServiceConfig, timeout: Duration) -> Self {
        let clear_port = if config.clear_port { config.target.local_port() } else { None };
        Self::new(config.name.clone(), config.start_command.clone(), timeout)
            .with_clear_port(clear_port)
            .with_output(config.output)
    }

    async fn clear(&self, port: u16) {
        let pids = match listener_pids(port).await {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!(port, error = %e, "Could not list service port listeners");
                return;
            }
        };
        if pids.is_empty() {
            tracing::debug!(port, "Service port is already free");
            return;
        }

        let status = Command::new("kill")
            .arg("-15")
            .args(pids.iter().map(u32::to_string))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(_) => tracing::info!(port, pids = ?pids, "Sent SIGTERM to service port listeners"),
            Err(e) => tracing::warn!(port, error = %e, "Could not signal service port listeners"),
        }
        time::sleep(CLEAR_SETTLE).await;
    }

    fn spawn(&self, command: &str) -> Result<(), ControlError> {
        let stdio = || match self.output {
            ServiceOutput::Discard => Stdio::null(),
            ServiceOutput::Inherit => Stdio::inherit(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(stdio())
            .stderr(stdio())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(ControlError::Spawn)?;
        tracing::info!(
            service = %self.service,
            pid = child.id().unwrap_or_default(),
            command,
            "Started service"
        );
        Ok(())
    }
}

/// PIDs of processes with a listening TCP socket on `port`, excluding this one.
async fn listener_pids(port: u16) -> std::io::Result<Vec<u32>> {
    let output = Command::new("lsof")
        .arg("-t")
        .arg(format!("-iTCP:{}", port))
        .arg("-sTCP:LISTEN")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await?;
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout), std::process::id()))
}

fn parse_pids(lsof_output: &str, exclude: u32) -> Vec<u32> {
    let mut pids: Vec<u32> = lsof_output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .filter(|&pid| pid != exclude && pid != 0)
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[async_trait]
impl ServiceControl for CommandControl {
    async fn restart(&self) -> Result<(), ControlError> {
        let Some(command) = self.start_command.as_deref() else {
            return Err(ControlError::NotConfigured(self.service.clone()));
        };

        let budget = self.timeout + CLEAR_SETTLE;
        let attempt = async {
            if let Some(port) = self.clear_port {
                self.clear(port).await;
            }
            self.spawn(command)
        };

        match time::timeout(budget, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ControlError::Timeout(budget)),
        }
    }
}
