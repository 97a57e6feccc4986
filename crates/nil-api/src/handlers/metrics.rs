//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so that Prometheus can scrape it. Labels carry no PII.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for `GET /metrics`.
#[tracing::instrument(skip_all, name = "nil.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
