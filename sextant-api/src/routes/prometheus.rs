//! Query proxy endpoints
//!
//! - `GET /api/prometheus/query_range`
//! - `GET /api/prometheus/query`

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use sextant_prom::{InstantData, MetricsBackend, RangeData};

use super::Envelope;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::{InstantQueryParams, QueryRangeParams};

pub async fn query_range(
    State(backend): State<Arc<dyn MetricsBackend>>,
    params: Result<Query<QueryRangeParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<RangeData>>> {
    let Query(params) = params?;
    let range = params.validate()?;

    tracing::debug!(
        query = %range.query,
        start = range.start,
        end = range.end,
        step = %range.step,
        "Proxying range query"
    );
    let data = backend.query_range(&range).await?;
    Ok(Envelope::ok(data))
}

pub async fn instant_query(
    State(backend): State<Arc<dyn MetricsBackend>>,
    params: Result<Query<InstantQueryParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<InstantData>>> {
    let Query(params) = params?;
    let query = params.validate()?;

    tracing::debug!(query = %query, "Proxying instant query");
    let data = backend.instant_query(&query).await?;
    Ok(Envelope::ok(data))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/prometheus/query_range", get(query_range))
        .route("/prometheus/query", get(instant_query))
}
