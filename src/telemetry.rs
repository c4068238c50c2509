//! OpenTelemetry tracing for the enhance pipeline.
//!
//! Exports per-stage spans to an OTLP-compatible backend (Jaeger, Tempo,
//! etc.) and falls back to plain stdout logging when no collector is
//! configured, so the service is still observable running bare on a
//! developer's machine.

use anyhow::{Context, Result};
use opentelemetry::{
    global,
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{self, RandomIdGenerator, Sampler},
    Resource,
};
use opentelemetry_semantic_conventions as semconv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// OTLP endpoint, e.g. "http://localhost:4317". Ignored when `enabled`
    /// is false.
    pub otlp_endpoint: String,
    pub enabled: bool,
    pub sampling_rate: f64,
    pub enable_stdout: bool,
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "promptmcp".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            enabled: false,
            sampling_rate: 1.0,
            enable_stdout: true,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Build from the loaded `Config`. OTLP export only turns on when
    /// `PROMPTMCP_OTLP_ENDPOINT` is set — a bare stdio tool shouldn't dial
    /// out on startup by default.
    pub fn from_env(log_level: &str) -> Self {
        match std::env::var("PROMPTMCP_OTLP_ENDPOINT") {
            Ok(endpoint) => Self {
                otlp_endpoint: endpoint,
                enabled: true,
                // Stdout logging would interleave with the stdio JSON-RPC
                // transport on stdout; when OTLP is on, keep stdout silent
                // and rely on the collector.
                enable_stdout: false,
                log_level: log_level.to_string(),
                ..Default::default()
            },
            Err(_) => Self {
                log_level: log_level.to_string(),
                ..Default::default()
            },
        }
    }
}

/// Initialize tracing for the whole process. The stdio transport owns
/// stdout for the JSON-RPC protocol, so all logging here goes to stderr.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    if !config.enabled {
        init_basic_logging(&config);
        return Ok(());
    }

    let resource = build_resource(&config);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&config.otlp_endpoint),
        )
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_rate))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .context("failed to install OTLP tracer")?;

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer.tracer("promptmcp"));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(telemetry_layer);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(&config.log_level));
        subscriber.with(fmt_layer).init();
    } else {
        subscriber.init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        "telemetry initialized"
    );

    Ok(())
}

fn init_basic_logging(config: &TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .init();
}

fn build_resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new(semconv::resource::SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(
            semconv::resource::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new(
            semconv::resource::DEPLOYMENT_ENVIRONMENT,
            config.environment.clone(),
        ),
    ])
}

pub async fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Span field names shared across the pipeline's stages, following
/// semantic-convention naming so a collector groups them sensibly.
pub mod attributes {
    pub const STAGE: &str = "promptmcp.stage";
    pub const CACHE_HIT: &str = "cache.hit";
    pub const FRAMEWORKS: &str = "promptmcp.frameworks";
    pub const LIBRARY_ID: &str = "context7.library_id";
    pub const TOKEN_COUNT: &str = "promptmcp.tokens";
    pub const DEADLINE_EXCEEDED: &str = "promptmcp.deadline_exceeded";
}
