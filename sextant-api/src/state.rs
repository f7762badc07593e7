//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use sextant_prom::MetricsBackend;

use crate::pipeline::QueryPipeline;

/// Application-wide state shared across all routes.
///
/// Built once in `main`; nothing here is a module-level singleton.
#[derive(Clone)]
pub struct AppState {
    /// Generation, screening and metric validation.
    pub pipeline: Arc<QueryPipeline>,
    /// Backend the query proxy routes and health check talk to.
    pub metrics_backend: Arc<dyn MetricsBackend>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<QueryPipeline>, metrics_backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            pipeline,
            metrics_backend,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<QueryPipeline>, pipeline);
crate::impl_from_ref!(Arc<dyn MetricsBackend>, metrics_backend);
crate::impl_from_ref!(Instant, start_time);
