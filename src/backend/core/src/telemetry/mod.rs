//! Telemetry: structured logging, optional OTLP trace export, Prometheus metrics.

pub mod metrics;

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

pub use self::metrics::{install_metrics_recorder, register_metric_descriptions};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. With an OTLP
/// endpoint, spans are also exported through a batch exporter.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let otel = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::config().with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
                    ])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let json = (config.log_format == LogFormat::Json).then(|| fmt::layer().json());
    let pretty = (config.log_format == LogFormat::Pretty).then(|| fmt::layer().pretty());

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(pretty)
        .try_init()?;

    tracing::info!(
        service_name = %config.service_name,
        otlp = config.otlp_endpoint.is_some(),
        "Telemetry initialized"
    );
    Ok(())
}

/// Flush and stop trace export.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
