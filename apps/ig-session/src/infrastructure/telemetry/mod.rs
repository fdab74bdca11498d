//! Tracing Setup
//!
//! Installs the global `tracing` subscriber: an env-filtered fmt layer,
//! plus an OTLP span exporter when one is configured. Spans carry the
//! service version and the IG environment as resource attributes so DEMO
//! and LIVE sessions can be told apart in the trace backend.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: "false" keeps traces local (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: ig-session)
//! - `IG_ENVIRONMENT`: Reported as `deployment.environment` (default: demo)
//! - `RUST_LOG`: Log filter, extended with `ig_session=info`

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "ig-session";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";
const DEFAULT_ENVIRONMENT: &str = "demo";

/// Directives layered on top of `RUST_LOG`.
const BASE_DIRECTIVES: [&str; 3] = ["ig_session=info", "hyper=warn", "h2=warn"];

/// Keeps the span exporter alive; flushes and shuts it down on drop.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Check if spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shut down span exporter: {e}");
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Where to export spans; `None` keeps them local.
    pub otlp_endpoint: Option<String>,
    /// Service name reported with every span.
    pub service_name: String,
    /// IG environment reported with every span.
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: Some(DEFAULT_OTLP_ENDPOINT.to_string()),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read the configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let exporting = lookup("OTEL_ENABLED").is_none_or(|v| !v.eq_ignore_ascii_case("false"));

        Self {
            otlp_endpoint: exporting.then(|| {
                lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string())
            }),
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            environment: lookup("IG_ENVIRONMENT")
                .map_or_else(|| DEFAULT_ENVIRONMENT.to_string(), |v| v.to_lowercase()),
        }
    }
}

/// Install the global subscriber using [`TelemetryConfig::from_env`].
///
/// Keep the returned guard alive until shutdown.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the global subscriber.
///
/// A failing exporter degrades to local logging instead of aborting.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = base_directives()
        .into_iter()
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let tracer_provider = config
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| tracer_provider(endpoint, config));

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    TelemetryGuard { tracer_provider }
}

fn tracer_provider(endpoint: &str, config: &TelemetryConfig) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("OTLP exporter unavailable, tracing locally only: {e}"))
        .ok()?;

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource(config))
            .build(),
    )
}

fn resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(
            "deployment.environment",
            config.environment.clone(),
        ))
        .build()
}

fn base_directives() -> Vec<Directive> {
    BASE_DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .collect()
}
