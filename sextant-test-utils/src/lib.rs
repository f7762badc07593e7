//! SEXTANT Test Utilities
//!
//! Centralized test infrastructure for the SEXTANT workspace:
//! - Scripted generation backend and canned metrics backends
//! - Proptest generators for queries, metric names and lookbacks
//! - Test fixtures for common scenarios
//! - Custom assertions for pipeline errors

pub use sextant_core::{
    GenerationError, LlmError, MetricCatalog, MetricsBackendError, SyntaxRule, ValidatedQuery,
};
pub use sextant_llm::{GenerationBackend, GenerationCandidate};
pub use sextant_prom::{InstantData, MetricsBackend, RangeData, RangeQuery};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// MOCK GENERATION BACKEND
// ============================================================================

/// Generation backend that replays scripted replies in call order.
///
/// Once the script runs out, every further call fails with a 503 so a test
/// that over-calls sees retryable failures rather than a hang.
#[derive(Debug)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<String>>,
    configured: bool,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            configured: true,
        }
    }

    /// Every call answers with `query`.
    pub fn always(query: impl Into<String>, times: usize) -> Self {
        let query = query.into();
        Self::new((0..times).map(|_| Ok(query.clone())).collect())
    }

    /// A backend without credentials.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    /// Candidate ids in the order they were called.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        candidate: &GenerationCandidate,
        _prompt: &str,
    ) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(candidate.id.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Err(errors::overloaded()))
    }

    fn backend_id(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

// ============================================================================
// MOCK METRICS BACKENDS
// ============================================================================

/// Metrics backend with a fixed name list and canned query results.
#[derive(Debug)]
pub struct StaticMetricsBackend {
    names: Vec<String>,
    range: RangeData,
    instant: InstantData,
    healthy: bool,
    list_calls: AtomicUsize,
}

impl StaticMetricsBackend {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            range: fixtures::range_data(),
            instant: fixtures::instant_data(),
            healthy: true,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_range_data(mut self, range: RangeData) -> Self {
        self.range = range;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsBackend for StaticMetricsBackend {
    async fn list_metric_names(&self) -> Result<Vec<String>, MetricsBackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.names.clone())
    }

    async fn query_range(&self, _query: &RangeQuery) -> Result<RangeData, MetricsBackendError> {
        Ok(self.range.clone())
    }

    async fn instant_query(&self, _query: &str) -> Result<InstantData, MetricsBackendError> {
        Ok(self.instant.clone())
    }

    async fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn backend_id(&self) -> &str {
        "static"
    }
}

/// Metrics backend where every call fails with the same error.
#[derive(Debug, Clone)]
pub struct FailingMetricsBackend {
    error: MetricsBackendError,
}

impl FailingMetricsBackend {
    pub fn new(error: MetricsBackendError) -> Self {
        Self { error }
    }

    pub fn unreachable() -> Self {
        Self::new(MetricsBackendError::Unreachable {
            reason: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl MetricsBackend for FailingMetricsBackend {
    async fn list_metric_names(&self) -> Result<Vec<String>, MetricsBackendError> {
        Err(self.error.clone())
    }

    async fn query_range(&self, _query: &RangeQuery) -> Result<RangeData, MetricsBackendError> {
        Err(self.error.clone())
    }

    async fn instant_query(&self, _query: &str) -> Result<InstantData, MetricsBackendError> {
        Err(self.error.clone())
    }

    async fn is_healthy(&self) -> bool {
        false
    }

    fn backend_id(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// CANNED ERRORS
// ============================================================================

pub mod errors {
    //! Generation failures shaped like real upstream replies.

    use super::LlmError;

    pub fn overloaded() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 503,
            message: "The model is overloaded. Please try again later.".to_string(),
        }
    }

    pub fn model_not_found() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 404,
            message: "models/x is not found for API version v1beta".to_string(),
        }
    }

    pub fn invalid_key() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 400,
            message: "API key not valid. Please pass a valid API key. (INVALID_ARGUMENT)"
                .to_string(),
        }
    }

    pub fn quota_exceeded() -> LlmError {
        LlmError::RateLimited {
            provider: "scripted".to_string(),
            retry_after_ms: 0,
            message: "You exceeded your current quota, please check your plan.".to_string(),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SEXTANT inputs.

    use proptest::prelude::*;

    /// Exporter-style metric name, always containing an underscore.
    pub fn arb_metric_name() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("node"), Just("windows"), Just("redis"), Just("pg"), Just("nginx")],
            "[a-z]{2,8}",
            prop_oneof![Just("_total"), Just("_bytes"), Just("_seconds_total"), Just("")],
        )
            .prop_map(|(prefix, body, suffix)| format!("{}_{}{}", prefix, body, suffix))
    }

    /// Range selector duration literal such as `5m` or `2h`.
    pub fn arb_duration_literal() -> impl Strategy<Value = String> {
        (1u32..120, prop_oneof![Just("s"), Just("m"), Just("h"), Just("d")])
            .prop_map(|(n, unit)| format!("{}{}", n, unit))
    }

    /// Well-formed query built from known shapes.
    pub fn arb_valid_query() -> impl Strategy<Value = String> {
        (arb_metric_name(), arb_duration_literal(), 0usize..4).prop_map(|(metric, range, shape)| {
            match shape {
                0 => metric,
                1 => format!("rate({}[{}])", metric, range),
                2 => format!("sum by (instance) (rate({}[{}]))", metric, range),
                _ => format!("avg(rate({}[{}])) * 100", metric, range),
            }
        })
    }

    /// Positive lookback within the accepted request range.
    pub fn arb_lookback_minutes() -> impl Strategy<Value = u32> {
        1u32..=10_080
    }

    /// Natural-language request that passes the low-intent guard.
    pub fn arb_request_text() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("cpu"), Just("memory"), Just("disk"), Just("network")],
            prop_oneof![Just("usage"), Just("read"), Just("throughput")],
            proptest::option::of(1u32..240),
        )
            .prop_map(|(resource, aspect, minutes)| match minutes {
                Some(m) => format!("{} {} for the last {} minutes", resource, aspect, m),
                None => format!("{} {}", resource, aspect),
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::{InstantData, RangeData};

    /// Names a small Linux host exposes.
    pub fn node_metric_names() -> Vec<&'static str> {
        vec![
            "up",
            "node_cpu_seconds_total",
            "node_memory_MemAvailable_bytes",
            "node_memory_MemTotal_bytes",
            "node_network_receive_bytes_total",
            "node_disk_read_bytes_total",
        ]
    }

    pub fn range_data() -> RangeData {
        serde_json::from_value(serde_json::json!({
            "resultType": "matrix",
            "result": [{
                "metric": {"instance": "localhost:9100", "job": "node"},
                "values": [[1700000000.0, "0.25"], [1700000015.0, "0.5"]]
            }]
        }))
        .unwrap_or_else(|_| RangeData {
            result_type: "matrix".to_string(),
            result: Vec::new(),
        })
    }

    pub fn instant_data() -> InstantData {
        serde_json::from_value(serde_json::json!({
            "resultType": "vector",
            "result": [{"metric": {"job": "node"}, "value": [1700000000.0, "1"]}]
        }))
        .unwrap_or_else(|_| InstantData {
            result_type: "vector".to_string(),
            result: sextant_prom::InstantResult::Vector(Vec::new()),
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions with readable failure output.

    use super::{GenerationError, SyntaxRule};

    /// Assert the query passes the syntax validator and return it.
    pub fn assert_valid_query(query: &str) -> super::ValidatedQuery {
        match sextant_core::validate(query) {
            Ok(validated) => validated,
            Err(e) => panic!("expected {:?} to validate, got {}", query, e),
        }
    }

    /// Assert the query is rejected by `rule`.
    pub fn assert_rejected_by(query: &str, rule: SyntaxRule) {
        match sextant_core::validate(query) {
            Ok(_) => panic!("expected {:?} to be rejected by {:?}", query, rule),
            Err(e) => assert_eq!(e.rule, rule, "wrong rule for {:?}", query),
        }
    }

    pub fn assert_overloaded<T: std::fmt::Debug>(result: &Result<T, GenerationError>) {
        assert!(
            matches!(result, Err(GenerationError::Overloaded { .. })),
            "expected Overloaded, got {:?}",
            result
        );
    }

    pub fn assert_authentication<T: std::fmt::Debug>(result: &Result<T, GenerationError>) {
        assert!(
            matches!(result, Err(GenerationError::Authentication { .. })),
            "expected Authentication, got {:?}",
            result
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidate(id: &str) -> GenerationCandidate {
        GenerationCandidate {
            id: id.to_string(),
            rank: 0,
        }
    }

    #[tokio::test]
    async fn test_scripted_backend_replays_then_overloads() {
        let backend = ScriptedBackend::new(vec![Ok("up".to_string())]);
        assert_eq!(backend.generate(&candidate("a"), "p").await, Ok("up".to_string()));
        assert_eq!(
            backend.generate(&candidate("b"), "p").await,
            Err(errors::overloaded())
        );
        assert_eq!(backend.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_static_backend_counts_listings() {
        let backend = StaticMetricsBackend::new(fixtures::node_metric_names());
        let names = backend.list_metric_names().await.expect("names");
        assert!(names.contains(&"up".to_string()));
        assert_eq!(backend.list_calls(), 1);
        assert!(backend.is_healthy().await);
    }

    #[test]
    fn test_fixtures_parse() {
        assert_eq!(fixtures::range_data().result.len(), 1);
        assert_eq!(fixtures::instant_data().result_type, "vector");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_generated_queries_validate(query in generators::arb_valid_query()) {
            prop_assert!(sextant_core::validate(&query).is_ok(), "rejected: {}", query);
        }

        #[test]
        fn prop_generated_requests_pass_intent_guard(text in generators::arb_request_text()) {
            prop_assert!(!sextant_core::is_low_intent(&text));
        }
    }
}
