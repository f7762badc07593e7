//! Prometheus Metrics Definitions
//!
//! Defines the SEXTANT metrics and the /metrics endpoint for scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use sextant_prom::RefreshStatus;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Global metrics instance - registered once per process
pub static METRICS: Lazy<ApiResult<SextantMetrics>> = Lazy::new(SextantMetrics::new);

/// Container for all SEXTANT metrics.
#[derive(Clone)]
pub struct SextantMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Candidate calls - labels: candidate, outcome
    pub generation_attempts_total: CounterVec,

    /// Finished translations - labels: outcome
    pub translations_total: CounterVec,

    /// Metric catalog refreshes - labels: status
    pub catalog_refreshes_total: CounterVec,
}

impl SextantMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "sextant_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "sextant_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            generation_attempts_total: register_counter_vec!(
                "sextant_generation_attempts_total",
                "Generation candidate calls by outcome",
                &["candidate", "outcome"]
            )
            .map_err(|e| registration_error("generation_attempts_total", e))?,

            translations_total: register_counter_vec!(
                "sextant_translations_total",
                "Natural-language translation requests by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("translations_total", e))?,

            catalog_refreshes_total: register_counter_vec!(
                "sextant_catalog_refreshes_total",
                "Metric catalog refreshes by status",
                &["status"]
            )
            .map_err(|e| registration_error("catalog_refreshes_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_generation_attempt(&self, candidate: &str, outcome: &str) {
        self.generation_attempts_total
            .with_label_values(&[candidate, outcome])
            .inc();
    }

    pub fn record_translation(&self, outcome: &str) {
        self.translations_total.with_label_values(&[outcome]).inc();
    }
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Refresh hook handed to the metric catalog cache.
pub fn record_catalog_refresh(status: RefreshStatus) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics
            .catalog_refreshes_total
            .with_label_values(&[status.as_str()])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
