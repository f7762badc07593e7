//! Prometheus HTTP API client

use crate::types::{ApiResponse, ErrorBody, InstantData, RangeData, RangeQuery};
use crate::MetricsBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use sextant_core::{redact_credentials, ConfigError, MetricsBackendError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";

/// Connection settings for Prometheus.
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub base_url: String,
    /// Timeout for queries and metric listing
    pub query_timeout: Duration,
    /// Timeout for `/-/healthy`
    pub health_timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROMETHEUS_URL.to_string(),
            query_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(3),
        }
    }
}

impl PrometheusConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Read `PROMETHEUS_URL` and `SEXTANT_PROMETHEUS_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("PROMETHEUS_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        };

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "PROMETHEUS_URL".to_string(),
                value: config.base_url,
                reason: "must start with http:// or https://".to_string(),
            });
        }

        if let Some(secs) = std::env::var("SEXTANT_PROMETHEUS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.query_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// REST client for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    config: PrometheusConfig,
}

impl PrometheusClient {
    pub fn new(config: PrometheusConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn transport_error(&self, e: &reqwest::Error) -> MetricsBackendError {
        if e.is_timeout() {
            MetricsBackendError::Timeout {
                seconds: self.config.query_timeout.as_secs(),
            }
        } else {
            MetricsBackendError::Unreachable {
                reason: redact_credentials(&e.to_string()),
            }
        }
    }

    /// Send a request and unwrap the `{status, data}` envelope.
    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, MetricsBackendError> {
        let response = request
            .timeout(self.config.query_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body);
            error!(status = status.as_u16(), error = %message, "Prometheus request failed");
            return Err(MetricsBackendError::from_prometheus_message(
                status.as_u16(),
                message,
            ));
        }

        let parsed: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| MetricsBackendError::InvalidResponse {
                reason: e.to_string(),
            })?;

        if !parsed.warnings.is_empty() {
            warn!(warnings = ?parsed.warnings, "Prometheus returned warnings");
        }

        if !parsed.is_success() {
            let message = parsed
                .error
                .unwrap_or_else(|| "Prometheus query failed".to_string());
            error!(error = %message, "Prometheus returned non-success status");
            return Err(MetricsBackendError::from_prometheus_message(
                status.as_u16(),
                message,
            ));
        }

        parsed.data.ok_or_else(|| MetricsBackendError::InvalidResponse {
            reason: "response has no data".to_string(),
        })
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn list_metric_names(&self) -> Result<Vec<String>, MetricsBackendError> {
        let request = self.client.get(self.url("/api/v1/label/__name__/values"));
        let names: Vec<String> = self.fetch(request).await?;
        debug!(count = names.len(), "Fetched metric names");
        Ok(names)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<RangeData, MetricsBackendError> {
        info!(
            query = %query.query,
            start = query.start,
            end = query.end,
            step = %query.step,
            "Executing Prometheus query_range"
        );
        let request = self.client.get(self.url("/api/v1/query_range")).query(&[
            ("query", query.query.clone()),
            ("start", query.start.to_string()),
            ("end", query.end.to_string()),
            ("step", query.step.clone()),
        ]);
        let data: RangeData = self.fetch(request).await?;
        info!(
            result_type = %data.result_type,
            result_count = data.result.len(),
            "Prometheus query successful"
        );
        Ok(data)
    }

    async fn instant_query(&self, query: &str) -> Result<InstantData, MetricsBackendError> {
        info!(query = %query, "Executing Prometheus instant query");
        let request = self
            .client
            .get(self.url("/api/v1/query"))
            .query(&[("query", query)]);
        self.fetch(request).await
    }

    async fn is_healthy(&self) -> bool {
        match self
            .client
            .get(self.url("/-/healthy"))
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %redact_credentials(&e.to_string()), "Prometheus health check failed");
                false
            }
        }
    }

    fn backend_id(&self) -> &str {
        "prometheus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PrometheusConfig::default();
        assert_eq!(config.base_url, "http://localhost:9090");
        assert_eq!(config.query_timeout, Duration::from_secs(10));
        assert_eq!(config.health_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = PrometheusClient::new(PrometheusConfig::new("http://prom:9090/"));
        assert_eq!(
            client.url("/api/v1/query"),
            "http://prom:9090/api/v1/query"
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let client = PrometheusClient::new(PrometheusConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            query_timeout: Duration::from_secs(2),
            health_timeout: Duration::from_secs(1),
        });
        assert!(!client.is_healthy().await);
        let err = client
            .list_metric_names()
            .await
            .expect_err("nothing listens on port 9");
        assert!(matches!(
            err,
            MetricsBackendError::Unreachable { .. } | MetricsBackendError::Timeout { .. }
        ));
    }
}
