//! Prometheus Metrics Module
//!
//! Exposes session metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Transitions**: Status changes by resulting status
//! - **Alarms**: Expiration alarms that actually fired
//! - **Expiry**: Seconds left on the current credentials
//! - **Subscribers**: Live status stream subscribers
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionStatus;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ig_session_transitions_total",
        "Total session status transitions by resulting status"
    );
    describe_counter!(
        "ig_session_alarms_fired_total",
        "Total expiration alarms that moved a session to expired"
    );
    describe_gauge!(
        "ig_session_seconds_until_expiry",
        "Seconds until the current credentials expire (0 when not ready)"
    );
    describe_gauge!(
        "ig_session_subscribers",
        "Number of live session status subscribers"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a status transition.
pub fn record_transition(status: SessionStatus) {
    counter!(
        "ig_session_transitions_total",
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record an expiration alarm that fired.
pub fn record_alarm_fired() {
    counter!("ig_session_alarms_fired_total").increment(1);
}

/// Update the seconds left on the current credentials.
pub fn set_seconds_until_expiry(seconds: f64) {
    gauge!("ig_session_seconds_until_expiry").set(seconds.max(0.0));
}

/// Update the live subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("ig_session_subscribers").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
