//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in a tracing span, records Prometheus metrics and
//! logs completion.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

/// Route templates served by the router. Anything else is reported as
/// `unmatched` so scanners cannot blow up label cardinality.
const KNOWN_PATHS: &[&str] = &[
    "/",
    "/metrics",
    "/api/nl2promql",
    "/api/health",
    "/api/prometheus/query_range",
    "/api/prometheus/query",
    "/api/debug/models",
];

/// Normalize a request path into a bounded metric label.
fn normalize_path(path: &str) -> String {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    if KNOWN_PATHS.contains(&trimmed) {
        trimmed.to_string()
    } else {
        "unmatched".to_string()
    }
}

/// Observability middleware for Axum.
///
/// This middleware wraps every request with:
/// 1. A tracing span carrying method and route
/// 2. Prometheus metrics recording
/// 3. A completion log line
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
