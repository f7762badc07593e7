//! Service index at `GET /`.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIndex {
    pub success: bool,
    pub message: &'static str,
    pub version: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: &'static str,
    pub nl2promql: &'static str,
    pub query_range: &'static str,
    pub query: &'static str,
    pub models: &'static str,
    pub metrics: &'static str,
}

pub async fn index() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        success: true,
        message: "Natural Language to PromQL API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: Endpoints {
            health: "GET /api/health",
            nl2promql: "POST /api/nl2promql",
            query_range: "GET /api/prometheus/query_range",
            query: "GET /api/prometheus/query",
            models: "GET /api/debug/models",
            metrics: "GET /metrics",
        },
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}
