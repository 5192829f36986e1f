//! Prometheus metrics registry, instruments, and the `/metrics` endpoint.

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::get,
};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth flow metrics
    pub static ref AUTH_FLOWS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("portico_auth_flows_total", "Total number of auth flow operations"),
        &["flow", "outcome"]
    ).expect("metric can be created");
    pub static ref PROVIDER_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("portico_provider_requests_total", "Total number of requests to the hosted provider"),
        &["operation", "status"]
    ).expect("metric can be created");

    // Client registry metrics
    pub static ref REGISTRY_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("portico_registry_hits_total", "Total number of client registry hits"),
        &["operation"]
    ).expect("metric can be created");
    pub static ref REGISTRY_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("portico_registry_misses_total", "Total number of client registry misses"),
        &["operation"]
    ).expect("metric can be created");
    pub static ref REGISTRY_CLIENTS: IntGauge = IntGauge::new(
        "portico_registry_clients",
        "Current number of client instances in the registry"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("portico_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(AUTH_FLOWS_TOTAL.clone()))
        .expect("AUTH_FLOWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROVIDER_REQUESTS_TOTAL.clone()))
        .expect("PROVIDER_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REGISTRY_HITS_TOTAL.clone()))
        .expect("REGISTRY_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REGISTRY_MISSES_TOTAL.clone()))
        .expect("REGISTRY_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REGISTRY_CLIENTS.clone()))
        .expect("REGISTRY_CLIENTS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");
}

/// Metrics endpoint handler
///
/// Returns all metrics in Prometheus text format.
async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, encoder.format_type())],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Create metrics router
///
/// Exposes the `/metrics` endpoint.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}
