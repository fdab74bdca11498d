//! IG Session Monitor Binary
//!
//! Holds an IG session, reports its status over HTTP and logs every status
//! transition until shut down.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ig-session
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `IG_API_KEY`: IG application API key
//!
//! ## Optional
//! - `IG_ENVIRONMENT`: DEMO | LIVE (default: DEMO)
//! - `IG_ACCOUNT_ID`: Account of the seeded session (required with tokens)
//! - `IG_CST`, `IG_SECURITY_TOKEN`: v2 session tokens to seed
//! - `IG_ACCESS_TOKEN`, `IG_REFRESH_TOKEN`: v3 OAuth tokens to seed
//! - `IG_SESSION_TTL_SECS`: Lifetime of the seeded tokens (default: 21600)
//! - `IG_SESSION_EXPIRY_LEAD_MS`: Expiry safety margin (default: 5000)
//! - `IG_SESSION_STATUS_CAPACITY`: Status channel capacity (default: 64)
//! - `IG_SESSION_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: ig-session)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use ig_session::infrastructure::telemetry;
use ig_session::{
    HealthServer, HealthServerState, MonitorConfig, SessionAuthority, SessionConfig,
    SessionStatus, StatusStream, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // dotenvy walks up from the working directory; a missing .env is fine.
    let dotenv_path = dotenvy::dotenv().ok();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        exporting_spans = telemetry_guard.is_exporting(),
        "Starting IG session monitor"
    );
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let authority = SessionAuthority::new(
        SessionConfig::from(config.session.clone()),
        config.seed_credentials(Utc::now()),
    )?;
    tracing::info!(
        authority = %authority.id(),
        status = %authority.status(),
        "Session authority ready"
    );

    // Log status transitions
    let statuses = authority.status_stream();
    let watcher = tokio::spawn(watch_statuses(statuses));

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        authority.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    await_shutdown(shutdown_token).await;

    authority.teardown();
    if let Err(e) = watcher.await {
        tracing::warn!(error = %e, "Status watcher ended abnormally");
    }

    tracing::info!("IG session monitor stopped");
    Ok(())
}

/// Log every status transition until the authority is torn down.
async fn watch_statuses(mut statuses: StatusStream) {
    while let Some(status) = statuses.next().await {
        match status {
            SessionStatus::Ready { until } => {
                tracing::info!(until = %until, "Session ready");
            }
            SessionStatus::Expired => {
                tracing::warn!("Session expired, re-authentication required");
            }
            SessionStatus::LoggedOut => {
                tracing::info!("Session logged out");
            }
        }
    }
    tracing::debug!("Status stream completed");
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        health_port = config.server.health_port,
        expiry_lead_ms = config.session.expiry_lead.as_millis(),
        seeded = config.seed.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        api_base_url = config.environment.api_base_url(),
        "REST gateway"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
