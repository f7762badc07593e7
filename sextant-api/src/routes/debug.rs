//! `GET /api/debug/models`: the candidate list the orchestrator walks.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::Envelope;
use crate::pipeline::QueryPipeline;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelListing {
    pub models: Vec<String>,
    pub configured_models: Vec<String>,
    pub is_configured: bool,
}

pub async fn list_models(State(pipeline): State<Arc<QueryPipeline>>) -> Json<Envelope<ModelListing>> {
    let models = pipeline.candidate_ids();
    tracing::info!(count = models.len(), "Listing generation candidates");

    Envelope::ok(ModelListing {
        configured_models: models.clone(),
        models,
        is_configured: pipeline.is_configured(),
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/debug/models", get(list_models))
}
