//! REST API Routes Module
//!
//! - `POST /api/nl2promql`: natural-language translation
//! - `GET /api/prometheus/query_range` and `GET /api/prometheus/query`: query proxy
//! - `GET /api/health`: dependency health
//! - `GET /api/debug/models`: generation candidates
//! - `GET /`: service index
//! - `GET /metrics`: Prometheus exposition

pub mod debug;
pub mod health;
pub mod index;
pub mod prometheus;
pub mod translate;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, header::HeaderName, HeaderValue, Method, Uri},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::middleware::{rate_limit_middleware, security_headers_middleware, RateLimitState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Success body shared by the JSON endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Build the application router.
///
/// Execution order: CORS -> Tracing -> Observability -> Security headers ->
/// Rate limiting (only under `/api`) -> Handler
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let rate_limit_state = RateLimitState::new(config);

    let api_routes = Router::new()
        .merge(translate::create_router())
        .merge(prometheus::create_router())
        .merge(health::create_router())
        .merge(debug::create_router())
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware));

    let cors = build_cors_layer(config);

    Router::new()
        .nest("/api", api_routes)
        .merge(index::create_router())
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(method.as_str(), uri.path())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// An empty origin list allows every origin. Otherwise only origins matching
/// the list (exact, `*` or `*.domain`) are echoed back.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
    let allowed = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| allowed.is_origin_allowed(o))
                .unwrap_or(false)
        },
    ));

    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn cors_app(origins: &[&str]) -> Router {
        let mut config = ApiConfig::default();
        config.cors_origins = origins.iter().map(|o| o.to_string()).collect();
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(build_cors_layer(&config))
    }

    async fn allow_origin_for(app: Router, origin: &str) -> Result<Option<String>, String> {
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    #[tokio::test]
    async fn test_cors_open_without_origin_list() -> Result<(), String> {
        let allowed = allow_origin_for(cors_app(&[]), "http://localhost:5173").await?;
        assert_eq!(allowed.as_deref(), Some("*"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cors_allow_list() -> Result<(), String> {
        let app = cors_app(&["https://grafana.example.com", "*.internal.io"]);

        let exact = allow_origin_for(app.clone(), "https://grafana.example.com").await?;
        assert_eq!(exact.as_deref(), Some("https://grafana.example.com"));

        let wildcard = allow_origin_for(app.clone(), "https://ops.internal.io").await?;
        assert_eq!(wildcard.as_deref(), Some("https://ops.internal.io"));

        let denied = allow_origin_for(app, "https://evil.example.org").await?;
        assert_eq!(denied, None);
        Ok(())
    }
}
