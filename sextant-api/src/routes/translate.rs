//! Natural-language translation endpoint
//!
//! `POST /api/nl2promql`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};

use super::Envelope;
use crate::error::ApiResult;
use crate::pipeline::{QueryPipeline, Translation};
use crate::state::AppState;
use crate::validation::TranslateBody;

/// Translate a sentence into a checked PromQL query.
pub async fn translate(
    State(pipeline): State<Arc<QueryPipeline>>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> ApiResult<Json<Envelope<Translation>>> {
    let Json(body) = body?;
    let request = body.validate()?;
    let translation = pipeline.translate(&request).await?;

    tracing::info!(
        promql = %translation.promql_query,
        model = %translation.model,
        attempts = translation.attempts,
        "Translation succeeded"
    );
    Ok(Envelope::ok(translation))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/nl2promql", post(translate))
}
