//! Tracing subscriber initialization
//!
//! Installs an `EnvFilter` plus a JSON formatting layer. `RUST_LOG`
//! overrides the default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_LOG_FILTER: &str =
    "sextant_api=debug,sextant_llm=info,sextant_prom=info,tower_http=info,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup record
    pub service_name: String,
    pub service_version: String,
    /// Environment (production, test, development)
    pub environment: String,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("SEXTANT_SERVICE_NAME")
                .unwrap_or_else(|_| "sextant-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: crate::config::Environment::from_env().as_str().to_string(),
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup, before anything logs. A second call fails because
/// a global subscriber is already installed.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Telemetry initialized"
    );

    Ok(())
}
