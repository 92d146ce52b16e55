//! The watchdog's own `/health` listener.
//!
//! # Responsibilities
//! - Answer `GET /health` for the peer watchdog and external tooling
//! - 200 + `"status": "UP"` while the cycle loop is making progress
//! - 503 + `"status": "DOWN"` when the loop has stalled
//!
//! # Design Decisions
//! - Runs as its own task; reads the [`StatusBoard`] snapshot only
//! - Never blocks on, or writes to, the scheduler's state

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::health::status::StatusBoard;

/// HTTP server exposing the liveness query.
pub struct HealthServer {
    router: Router,
}

impl HealthServer {
    pub fn new(board: Arc<StatusBoard>, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(board, request_timeout),
        }
    }

    #[allow(deprecated)]
    fn build_router(board: Arc<StatusBoard>, request_timeout: Duration) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/", get(health_handler))
            .with_state(board)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Health endpoint listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Health endpoint stopped");
        Ok(())
    }
}

async fn health_handler(State(board): State<Arc<StatusBoard>>) -> impl IntoResponse {
    let report = board.report(Instant::now());
    let status = if report.healthy {
        StatusCode::OK
    } else {
        tracing::warn!(
            last_cycle_age_ms = report.last_cycle_age_ms,
            "Cycle loop is stale, reporting DOWN"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
