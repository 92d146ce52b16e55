//! Shared utilities for the pair integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pair_watchdog::config::schema::RawConfig;
use pair_watchdog::config::validation::validate_config;
use pair_watchdog::config::{Role, WatchdogConfig};
use pair_watchdog::control::{ControlError, ServiceControl};
use pair_watchdog::health::HttpProber;
use pair_watchdog::lifecycle::startup::{self, StartupError};
use pair_watchdog::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A supervised service whose health can be flipped from the test.
pub struct MockService {
    pub addr: SocketAddr,
    pub up: Arc<AtomicBool>,
}

impl MockService {
    pub fn url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// Start a mock service answering 200 `{"healthy":true}` while up, 503 otherwise.
pub async fn start_mock_service(initially_up: bool) -> MockService {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let up = Arc::new(AtomicBool::new(initially_up));

    let flag = up.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let flag = flag.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = if flag.load(Ordering::SeqCst) {
                            ("200 OK", r#"{"healthy":true}"#)
                        } else {
                            ("503 Service Unavailable", r#"{"healthy":false}"#)
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockService { addr, up }
}

/// Start a backend that always answers with the given status line and body.
pub async fn start_fixed_backend(status: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Restart action that counts calls and, when `heals`, brings the mock service back.
pub struct RecordingControl {
    pub calls: AtomicUsize,
    service_up: Arc<AtomicBool>,
    heals: bool,
}

impl RecordingControl {
    pub fn healing(service: &MockService) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            service_up: service.up.clone(),
            heals: true,
        })
    }

    pub fn broken(service: &MockService) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            service_up: service.up.clone(),
            heals: false,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceControl for RecordingControl {
    async fn restart(&self) -> Result<(), ControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.heals {
            self.service_up.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Fast-cycling configuration for tests.
pub fn fast_config(role: Role, peer_url: &str, service_url: &str, defer_secs: Option<f64>) -> WatchdogConfig {
    let mut raw = RawConfig::default();
    raw.watchdog.role = Some(role);
    raw.watchdog.peer_url = Some(peer_url.to_string());
    raw.watchdog.health_bind = Some("127.0.0.1".into());
    raw.watchdog.check_every = Some(0.1);
    raw.watchdog.request_timeout = Some(0.3);
    raw.watchdog.defer_seconds = defer_secs;
    raw.service.name = Some("mock".into());
    raw.service.url = Some(service_url.to_string());
    raw.backoff.min = Some(0.1);
    raw.backoff.max = Some(0.4);
    validate_config(&raw).unwrap()
}

pub struct RunningWatchdog {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

impl RunningWatchdog {
    pub fn health_url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        self.handle.await.unwrap()
    }
}

/// Run a watchdog on an already-bound listener with the real prober.
pub fn spawn_watchdog(
    config: WatchdogConfig,
    listener: TcpListener,
    control: Arc<dyn ServiceControl>,
) -> RunningWatchdog {
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(startup::serve(
        config,
        listener,
        Arc::new(HttpProber::new()),
        control,
        shutdown.clone(),
    ));
    RunningWatchdog {
        addr,
        shutdown,
        handle,
    }
}

/// Poll `cond` every 20ms until it holds or `within` elapses.
pub async fn eventually(within: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    cond()
}
