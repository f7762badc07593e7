//! SEXTANT API Server Entry Point
//!
//! Reads configuration, wires the generation and metrics backends into the
//! pipeline, and serves the router until ctrl-c or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use sextant_api::telemetry::{init_tracer, TelemetryConfig};
use sextant_api::{create_router, ApiConfig, ApiError, ApiResult, AppState, ErrorCode, QueryPipeline};
use sextant_llm::{GeminiClient, GeminiConfig};
use sextant_prom::{MetricsBackend, PrometheusClient, PrometheusConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();

    let prometheus_config = PrometheusConfig::from_env()
        .map_err(|e| ApiError::new(ErrorCode::InternalError, e.to_string()))?;
    let prometheus_url = prometheus_config.base_url.clone();
    let metrics_backend: Arc<dyn MetricsBackend> = Arc::new(PrometheusClient::new(prometheus_config));

    let gemini_config = GeminiConfig::from_env();
    if !gemini_config.is_configured() {
        tracing::warn!("GEMINI_API_KEY not set; translation requests will fail with NOT_CONFIGURED");
    }
    let generation = Arc::new(GeminiClient::new(gemini_config));

    let pipeline = QueryPipeline::from_config(&api_config, generation, metrics_backend.clone());
    tracing::info!(
        candidates = ?pipeline.candidate_ids(),
        generation_timeout_secs = api_config.generation_timeout.as_secs(),
        catalog_ttl_secs = api_config.catalog_ttl.as_secs(),
        "Pipeline ready"
    );

    let state = AppState::new(Arc::new(pipeline), metrics_backend);
    let app = create_router(state, &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(
        %addr,
        environment = api_config.environment.as_str(),
        prometheus_url = %prometheus_url,
        "Starting SEXTANT API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("SEXTANT_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT").unwrap_or_else(|_| "4000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_field("PORT", format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_field(
            "SEXTANT_API_BIND",
            format!("Invalid bind address {}: {}", addr, e),
        )
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
