//! SEXTANT Core - Query Screening Primitives
//!
//! Pure, network-free building blocks of the natural-language to PromQL
//! pipeline: the syntax validator, metric identifier extraction and the
//! catalog snapshot, lookback reconciliation, the low-intent guard and
//! credential redaction. The generation and Prometheus crates build on
//! these.

pub mod error;
pub mod health;
pub mod intent;
pub mod lookback;
pub mod metrics;
pub mod promql;
pub mod redact;

pub use error::{
    ConfigError, GenerationError, LlmError, MetricsBackendError, SextantError, SextantResult,
    SyntaxViolation,
};
pub use health::{overall_status, HealthCheck, HealthStatus};
pub use intent::{is_low_intent, sanitize_input, LOW_INTENT_MESSAGE, METRIC_KEYWORDS};
pub use lookback::{detect_lookback, reconcile, rewrite_range_selectors, LookbackWindow};
pub use metrics::{
    extract_metric_candidates, partition, partition_candidates, MetricCatalog, MetricPartition,
};
pub use promql::{
    delimiters_balanced, normalize, screen, validate, Screened, SyntaxRule, ValidatedQuery,
    MAX_QUERY_LEN, NO_ANSWER_SENTINEL,
};
pub use redact::redact_credentials;
