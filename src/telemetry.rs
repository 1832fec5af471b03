//! Logging and metrics setup for relay-subscription.
//!
//! - `tracing` fmt output filtered by the configured level (`RUST_LOG` wins)
//! - Prometheus scrape endpoint with the `prometheus` feature
//! - OTLP span export with the `otel` feature

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::TelemetryConfig;

#[cfg(feature = "otel")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> =
    std::sync::OnceLock::new();

/// Boxed error returned by telemetry setup.
pub type TelemetryError = Box<dyn std::error::Error + Send + Sync>;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber and, if configured, the metrics exporter.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let mut layers: Vec<BoxedLayer> = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter)
        .boxed()];

    if let Some(otel) = otel_layer(config)? {
        layers.push(otel);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "Prometheus metrics exporter started");
    }

    Ok(())
}

#[cfg(feature = "otel")]
fn otel_layer(config: &TelemetryConfig) -> Result<Option<BoxedLayer>, TelemetryError> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

    let Some(ref otel) = config.opentelemetry else {
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel.endpoint)
        .build()?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, otel.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    let tracer = provider.tracer("relay-subscription");
    let _ = TRACER_PROVIDER.set(provider);

    Ok(Some(
        tracing_opentelemetry::layer().with_tracer(tracer).boxed(),
    ))
}

#[cfg(not(feature = "otel"))]
fn otel_layer(config: &TelemetryConfig) -> Result<Option<BoxedLayer>, TelemetryError> {
    if config.opentelemetry.is_some() {
        return Err("opentelemetry configured but the `otel` feature is disabled".into());
    }
    Ok(None)
}

/// Flush pending spans before exit.
pub fn shutdown() {
    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!("Error shutting down tracer provider: {}", e);
        }
    }
}
