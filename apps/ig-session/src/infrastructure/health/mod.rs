//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint reporting the session status and Prometheus metrics.
//! Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status with the session snapshot
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while the session is `Ready`)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SessionAuthority, SessionSnapshot};
use crate::domain::session::SessionStatus;
use crate::infrastructure::metrics::get_metrics_handle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Session authority snapshot.
    pub session: SessionSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Session is ready for requests.
    Healthy,
    /// Session expired; re-authentication pending.
    Degraded,
    /// No session, or the authority was torn down.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// What the health endpoints report on.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    authority: SessionAuthority,
}

impl HealthServerState {
    /// Report on `authority` under the given service version.
    #[must_use]
    pub fn new(version: String, authority: SessionAuthority) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            authority,
        }
    }

    fn report(&self) -> HealthResponse {
        let session = self.authority.snapshot();
        HealthResponse {
            status: HealthStatus::of(&session),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            session,
        }
    }
}

impl HealthStatus {
    /// Map a session snapshot onto an overall health status.
    #[must_use]
    pub fn of(session: &SessionSnapshot) -> Self {
        match (session.closed, session.status) {
            (true, _) | (false, SessionStatus::LoggedOut) => Self::Unhealthy,
            (false, SessionStatus::Expired) => Self::Degraded,
            (false, SessionStatus::Ready { .. }) => Self::Healthy,
        }
    }

    const fn status_code(self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Degraded | Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// HTTP server for the health endpoints, stopped by a cancellation token.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a server for `port`; nothing is bound until [`run`](Self::run).
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until the cancellation token trips.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if the port cannot be bound or the
    /// server fails while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HealthServerError::Bind {
                port: self.port,
                source,
            })?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes for the health endpoints.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(|| async { "OK" }))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let report = state.report();
    (report.status.status_code(), Json(report))
}

/// `READY` while the session can authenticate requests, otherwise the
/// status name.
async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    match state.authority.status() {
        SessionStatus::Ready { .. } => (StatusCode::OK, "READY"),
        other => (StatusCode::SERVICE_UNAVAILABLE, other.as_str()),
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// The port could not be bound.
    #[error("failed to bind health port {port}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("health server failed")]
    Serve(#[source] std::io::Error),
}

// =============================================================================
// Tests
// =============================================================================
