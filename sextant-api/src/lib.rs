//! SEXTANT API - HTTP layer for natural-language PromQL generation
//!
//! Exposes the translation pipeline (candidate fallback, syntax screening,
//! lookback reconciliation and metric validation) over axum, together with
//! a thin query proxy to the metrics backend, health and debug endpoints.

#[macro_use]
pub mod macros;

pub mod config;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use config::{ApiConfig, Environment};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use pipeline::{QueryPipeline, Translation, TranslationError, TranslationRequest};
pub use routes::create_router;
pub use state::AppState;
