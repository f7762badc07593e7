//! The natural-language to PromQL pipeline.
//!
//! One [`QueryPipeline`] is built at startup and shared through axum state.
//! A translation runs: sanitize, low-intent guard, candidate fallback with
//! syntax screening, lookback reconciliation, then metric validation against
//! the cached catalog.

use std::sync::Arc;

use serde::Serialize;
use sextant_core::{
    detect_lookback, is_low_intent, partition_candidates, sanitize_input, GenerationError,
    LookbackWindow, MetricPartition, LOW_INTENT_MESSAGE,
};
use sextant_llm::{GenerationBackend, GenerationOrchestrator, GenerationRun, RetryPolicy};
use sextant_prom::{MetricCatalogCache, MetricsBackend};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::telemetry::{record_catalog_refresh, METRICS};

/// A validated translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    /// Window the caller asked for, in minutes
    pub lookback_minutes: Option<u32>,
}

/// An accepted translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub natural_language_query: String,
    pub promql_query: String,
    /// Effective window applied to range selectors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_minutes: Option<u32>,
    /// Candidate that produced the query
    pub model: String,
    pub attempts: usize,
}

/// Why a translation was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("{}", LOW_INTENT_MESSAGE)]
    LowIntent,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Generated query references unknown metric(s): {}", .partition.unknown.join(", "))]
    UnknownMetrics {
        query: String,
        partition: MetricPartition,
    },
}

impl TranslationError {
    /// Stable label used for the translations counter.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            TranslationError::LowIntent => "low_intent",
            TranslationError::UnknownMetrics { .. } => "unknown_metrics",
            TranslationError::Generation(err) => match err {
                GenerationError::NotConfigured | GenerationError::NoCandidates => {
                    "not_configured"
                }
                GenerationError::Authentication { .. } => "auth_failed",
                GenerationError::QuotaExhausted { .. } => "quota_exceeded",
                GenerationError::Overloaded { .. } => "overloaded",
                GenerationError::SyntaxExhausted { .. } => "syntax_violation",
                GenerationError::Exhausted { .. } => "failed",
                GenerationError::NoAnswer { .. } => "no_answer",
            },
        }
    }
}

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::LowIntent => ApiError::low_intent(),
            TranslationError::Generation(err) => err.into(),
            TranslationError::UnknownMetrics { partition, .. } => {
                ApiError::unknown_metrics(&partition.unknown, &partition.known)
            }
        }
    }
}

/// Generation orchestrator plus the metric catalog it validates against.
pub struct QueryPipeline {
    orchestrator: GenerationOrchestrator,
    catalog: Arc<MetricCatalogCache>,
}

impl QueryPipeline {
    pub fn new(orchestrator: GenerationOrchestrator, catalog: Arc<MetricCatalogCache>) -> Self {
        Self {
            orchestrator,
            catalog,
        }
    }

    /// Wire the candidate policy and catalog cache from configuration.
    pub fn from_config(
        config: &ApiConfig,
        generation: Arc<dyn GenerationBackend>,
        metrics: Arc<dyn MetricsBackend>,
    ) -> Self {
        let policy = RetryPolicy::new(config.candidates.clone())
            .with_attempt_timeout(config.generation_timeout);
        let catalog = MetricCatalogCache::new(metrics, config.catalog_ttl)
            .with_refresh_hook(record_catalog_refresh);
        Self::new(
            GenerationOrchestrator::new(generation, policy),
            Arc::new(catalog),
        )
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn catalog(&self) -> &MetricCatalogCache {
        &self.catalog
    }

    /// Whether the generation backend has credentials.
    pub fn is_configured(&self) -> bool {
        self.orchestrator.is_configured()
    }

    /// Candidate identifiers in priority order.
    pub fn candidate_ids(&self) -> Vec<String> {
        self.orchestrator.policy().candidates().ids()
    }

    /// Translate one request, recording its outcome.
    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<Translation, TranslationError> {
        let result = self.run(request).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome_label(),
        };
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_translation(outcome);
        }
        result
    }

    async fn run(&self, request: &TranslationRequest) -> Result<Translation, TranslationError> {
        let text = sanitize_input(&request.text);
        info!(
            original = %request.text,
            sanitized = %text,
            lookback_minutes = ?request.lookback_minutes,
            "Translation request"
        );

        if is_low_intent(&text) {
            info!(query = %text, "Rejected low-intent request");
            return Err(TranslationError::LowIntent);
        }

        let run = self.orchestrator.run(&text).await;
        record_attempts(&run);
        let generated = run.outcome?;

        let window = LookbackWindow::new(detect_lookback(&text), request.lookback_minutes);
        let effective = window.effective();
        let query = generated.query.with_lookback(effective);
        if query.as_str() != generated.query.as_str() {
            info!(
                original = %generated.query,
                adjusted = %query,
                detected = ?window.detected,
                requested = ?window.requested,
                "Adjusted range selectors to the lookback window"
            );
        }

        let catalog = self.catalog.current().await;
        if catalog.is_empty() {
            debug!("Metric catalog empty, accepting all metric names");
        }
        let partition = partition_candidates(query.metric_candidates(), &catalog);
        if !partition.all_known() {
            warn!(
                query = %query,
                unknown = ?partition.unknown,
                "Generated query references unknown metrics"
            );
            return Err(TranslationError::UnknownMetrics {
                query: query.into_string(),
                partition,
            });
        }

        Ok(Translation {
            natural_language_query: text,
            promql_query: query.into_string(),
            lookback_minutes: effective,
            model: generated.candidate,
            attempts: generated.attempts,
        })
    }
}

fn record_attempts(run: &GenerationRun) {
    if let Ok(metrics) = METRICS.as_ref() {
        for attempt in &run.attempts {
            metrics.record_generation_attempt(&attempt.candidate, attempt.outcome.label());
        }
    }
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("backend", &self.orchestrator.backend_id())
            .field("candidates", &self.candidate_ids())
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sextant_llm::{CandidateList, RetryPolicy};
    use sextant_test_utils::{errors, FailingMetricsBackend, ScriptedBackend, StaticMetricsBackend};
    use std::time::Duration;

    fn pipeline(backend: Arc<ScriptedBackend>, names: &[&str]) -> QueryPipeline {
        let policy = RetryPolicy::new(CandidateList::new(["model-a", "model-b", "model-c"]));
        let orchestrator = GenerationOrchestrator::new(backend, policy);
        let metrics = Arc::new(StaticMetricsBackend::new(names.iter().copied()));
        let catalog = Arc::new(MetricCatalogCache::new(metrics, Duration::from_secs(60)));
        QueryPipeline::new(orchestrator, catalog)
    }

    fn request(text: &str, lookback: Option<u32>) -> TranslationRequest {
        TranslationRequest {
            text: text.to_string(),
            lookback_minutes: lookback,
        }
    }

    #[tokio::test]
    async fn test_detected_window_rewrites_ranges() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::always(
            "100 - (avg(rate(node_cpu_seconds_total{mode=\"idle\"}[5m])) * 100)",
            1,
        ));
        let pipeline = pipeline(backend, &["node_cpu_seconds_total"]);

        let translation = pipeline
            .translate(&request("CPU usage for the last 15 minutes", None))
            .await?;
        assert!(translation.promql_query.contains("[15m]"));
        assert!(!translation.promql_query.contains("[5m]"));
        assert_eq!(translation.lookback_minutes, Some(15));
        assert_eq!(translation.model, "model-a");
        assert_eq!(translation.attempts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_detected_window_beats_requested() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::always("rate(node_network_receive_bytes_total[5m])", 1));
        let pipeline = pipeline(backend, &["node_network_receive_bytes_total"]);

        let translation = pipeline
            .translate(&request("network traffic last 2 hours", Some(30)))
            .await?;
        assert_eq!(translation.lookback_minutes, Some(120));
        assert!(translation.promql_query.contains("[120m]"));
        Ok(())
    }

    #[tokio::test]
    async fn test_requested_window_applies_without_detection() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::always("rate(node_disk_read_bytes_total[5m])", 1));
        let pipeline = pipeline(backend, &["node_disk_read_bytes_total"]);

        let translation = pipeline
            .translate(&request("disk read throughput", Some(45)))
            .await?;
        assert_eq!(translation.promql_query, "rate(node_disk_read_bytes_total[45m])");
        Ok(())
    }

    #[tokio::test]
    async fn test_low_intent_makes_no_attempts() {
        let backend = Arc::new(ScriptedBackend::always("up", 3));
        let pipeline = pipeline(backend.clone(), &["up"]);

        let result = pipeline.translate(&request("hello there friend", None)).await;
        assert_eq!(result, Err(TranslationError::LowIntent));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sanitized_text_is_reported() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::always("node_memory_MemAvailable_bytes", 1));
        let pipeline = pipeline(backend, &["node_memory_MemAvailable_bytes"]);

        let translation = pipeline
            .translate(&request("<b>memory usage</b>;DROP now", None))
            .await?;
        assert_eq!(translation.natural_language_query, "bmemory usage/b now");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_metrics_rejected() {
        let backend = Arc::new(ScriptedBackend::always("rate(made_up_metric_total[5m])", 1));
        let pipeline = pipeline(backend, &["node_cpu_seconds_total"]);

        let result = pipeline.translate(&request("CPU usage now please", None)).await;
        match result {
            Err(err @ TranslationError::UnknownMetrics { .. }) => {
                assert_eq!(err.outcome_label(), "unknown_metrics");
                let api: ApiError = err.into();
                assert!(api.message.contains("made_up_metric_total"));
            }
            other => panic!("expected unknown metrics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fail_open() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::always("rate(anything_total[5m])", 1));
        let policy = RetryPolicy::new(CandidateList::new(["model-a"]));
        let catalog = Arc::new(MetricCatalogCache::new(
            Arc::new(FailingMetricsBackend::unreachable()),
            Duration::from_secs(60),
        ));
        let pipeline = QueryPipeline::new(GenerationOrchestrator::new(backend, policy), catalog);

        let translation = pipeline.translate(&request("requests rate of anything", None)).await?;
        assert_eq!(translation.promql_query, "rate(anything_total[5m])");
        Ok(())
    }

    #[tokio::test]
    async fn test_fallback_then_success() -> Result<(), TranslationError> {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(errors::overloaded()),
            Ok("sum by (instance) rate(x_total[5m])".to_string()),
            Ok("sum by (instance) (rate(node_cpu_seconds_total[5m]))".to_string()),
        ]));
        let pipeline = pipeline(backend.clone(), &["node_cpu_seconds_total"]);

        let translation = pipeline.translate(&request("cpu usage by instance", None)).await?;
        assert_eq!(translation.model, "model-c");
        assert_eq!(translation.attempts, 3);
        assert_eq!(backend.calls(), vec!["model-a", "model-b", "model-c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_generation_errors_pass_through() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(errors::invalid_key())]));
        let pipeline = pipeline(backend.clone(), &["up"]);

        let result = pipeline.translate(&request("cpu usage last hour", None)).await;
        assert!(matches!(
            result,
            Err(TranslationError::Generation(GenerationError::Authentication { .. }))
        ));
        assert_eq!(backend.call_count(), 1);
    }
}
