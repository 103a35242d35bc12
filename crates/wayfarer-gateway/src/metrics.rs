//! Prometheus metrics recording and endpoint.

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
///
/// Only one recorder can be installed per process.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))
}

/// Outcome label for an analysis response status.
pub fn outcome(status: StatusCode) -> &'static str {
    if status.is_success() {
        "ok"
    } else if status.is_client_error() {
        "rejected"
    } else {
        "error"
    }
}

/// Record one `/analyze` request with its duration.
pub fn record_analyze(status: StatusCode, duration_secs: f64) {
    let labels = [("outcome", outcome(status).to_string())];
    metrics::counter!("analyze_requests_total", &labels).increment(1);
    metrics::histogram!("analyze_duration_seconds").record(duration_secs);
}
