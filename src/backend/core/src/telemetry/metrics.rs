//! Prometheus recorder and metric descriptions.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Install the global Prometheus recorder. The handle renders `/metrics`.
pub fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("carehub_pipeline_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()?;

    register_metric_descriptions();
    Ok(handle)
}

pub fn register_metric_descriptions() {
    describe_counter!(
        "carehub_authz_decisions_total",
        "Role authorization decisions by decision, resource and action"
    );
    describe_counter!(
        "carehub_ownership_checks_total",
        "Resource ownership checks by resource and outcome"
    );
    describe_counter!(
        "carehub_pipeline_terminations_total",
        "Pipelines stopped before the handler, by stage and code"
    );
    describe_counter!("carehub_errors_total", "Errors by error code");
    describe_histogram!(
        "carehub_pipeline_duration_seconds",
        Unit::Seconds,
        "Pipeline duration per route"
    );
}
