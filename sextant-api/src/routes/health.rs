//! Health Check Endpoint
//!
//! `GET /api/health` answers 200 when the metrics backend is up and the
//! generation backend has credentials, 503 otherwise. The body has the same
//! shape either way.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use sextant_core::{overall_status, HealthCheck, HealthStatus};
use sextant_prom::MetricsBackend;

use super::Envelope;
use crate::pipeline::QueryPipeline;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub status: HealthStatus,
    /// RFC 3339
    pub timestamp: String,
    pub services: ServiceFlags,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFlags {
    pub prometheus_up: bool,
    pub ai_configured: bool,
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn health(
    State(pipeline): State<Arc<QueryPipeline>>,
    State(backend): State<Arc<dyn MetricsBackend>>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let checks = vec![
        check_metrics_backend(backend.as_ref()).await,
        check_generation(&pipeline),
    ];
    let status = overall_status(&checks);
    let services = ServiceFlags {
        prometheus_up: checks[0].is_healthy(),
        ai_configured: checks[1].is_healthy(),
    };
    let ok = status == HealthStatus::Healthy;

    let report = HealthReport {
        ok,
        status,
        timestamp: Utc::now().to_rfc3339(),
        services,
        uptime_seconds: start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        checks,
    };

    if !ok {
        tracing::warn!(
            prometheus_up = services.prometheus_up,
            ai_configured = services.ai_configured,
            "Health check failing"
        );
    }

    let code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Envelope::ok(report))
}

async fn check_metrics_backend(backend: &dyn MetricsBackend) -> HealthCheck {
    let start = Instant::now();
    let up = backend.is_healthy().await;
    let elapsed = start.elapsed().as_millis() as u64;

    if up {
        HealthCheck::healthy(backend.backend_id()).with_response_time(elapsed)
    } else {
        HealthCheck::unhealthy(backend.backend_id(), "Health probe failed")
            .with_response_time(elapsed)
    }
}

fn check_generation(pipeline: &QueryPipeline) -> HealthCheck {
    let id = pipeline.orchestrator().backend_id();
    if pipeline.is_configured() {
        HealthCheck::healthy(id)
    } else {
        HealthCheck::degraded(id, "No API key configured")
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
