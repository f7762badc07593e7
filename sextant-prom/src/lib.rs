//! SEXTANT Prom - Metrics Backend Access
//!
//! The [`MetricsBackend`] trait, its Prometheus HTTP implementation and the
//! [`MetricCatalogCache`] used to check generated queries against the metric
//! names the backend actually has.

use async_trait::async_trait;
use sextant_core::MetricsBackendError;

pub mod catalog;
pub mod client;
pub mod types;

pub use catalog::{MetricCatalogCache, RefreshHook, RefreshStatus, DEFAULT_CATALOG_TTL};
pub use client::{PrometheusClient, PrometheusConfig, DEFAULT_PROMETHEUS_URL};
pub use types::{
    InstantData, InstantResult, InstantSample, RangeData, RangeQuery, RangeSeries, SamplePair,
};

/// Time-series backend the pipeline reads metric names from and proxies
/// queries to.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Every metric name the backend currently knows.
    async fn list_metric_names(&self) -> Result<Vec<String>, MetricsBackendError>;

    async fn query_range(&self, query: &RangeQuery) -> Result<RangeData, MetricsBackendError>;

    async fn instant_query(&self, query: &str) -> Result<InstantData, MetricsBackendError>;

    /// Liveness probe. Never errors; unreachable means unhealthy.
    async fn is_healthy(&self) -> bool;

    fn backend_id(&self) -> &str;
}
