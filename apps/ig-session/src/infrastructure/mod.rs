//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the runtime machinery behind the session authority
//! and the operational surface of the monitor binary.

/// Broadcast channel for session status transitions.
pub mod broadcast;

/// One-shot expiration alarm.
pub mod scheduler;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
