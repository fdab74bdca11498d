#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! IG Session - Credential Authority
//!
//! Holds the current credentials of an IG trading API session, detects
//! their expiration and broadcasts session status transitions to the rest
//! of the client SDK.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Credentials, status and expiry predicates
//!   - `session`: `Credentials`, `SessionToken`, `SessionStatus`, clock guard
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `Clock` interface
//!   - `services`: `SessionAuthority`
//!
//! - **Infrastructure**: Runtime machinery and operational surface
//!   - `broadcast`: Status fan-out over a tokio broadcast channel
//!   - `scheduler`: One-shot expiration alarm
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! login flow ──set_credentials──┐
//!                               ▼
//!                     ┌──────────────────┐      ┌─────────────┐
//! expiration alarm ──►│ SessionAuthority │─────►│ Broadcaster │──► subscriber 1
//!                     └──────────────────┘      └─────────────┘──► subscriber N
//!                               │
//! request builder ◄─credentials─┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session types with no runtime dependencies.
pub mod domain;

/// Application layer - Session authority and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and operational surface.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::{Credentials, SessionStatus, SessionToken};

// Ports
pub use application::ports::{Clock, SystemClock};

// Session authority
pub use application::services::{
    DEFAULT_EXPIRY_LEAD, SessionAuthority, SessionConfig, SessionError, SessionSnapshot,
};

// Status stream
pub use infrastructure::broadcast::{StatusBroadcaster, StatusStream};

// Configuration
pub use infrastructure::config::{ConfigError, Environment, MonitorConfig, SessionSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
