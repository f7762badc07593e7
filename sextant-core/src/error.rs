//! Error types for SEXTANT operations

use crate::promql::SyntaxRule;
use thiserror::Error;

/// Generation backend errors.
///
/// These are raw failures from a single candidate call. The orchestrator
/// classifies them; they are never shown to callers without redaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No generation backend configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider} (429), retry after {retry_after_ms}ms: {message}")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
        message: String,
    },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Network error talking to {provider}: {reason}")]
    Network { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// A generated query broke one of the PromQL grammar rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid PromQL syntax: {}", .rule.description())]
pub struct SyntaxViolation {
    /// Which rule failed
    pub rule: SyntaxRule,
    /// The normalized text that was checked
    pub query: String,
}

impl SyntaxViolation {
    pub fn new(rule: SyntaxRule, query: impl Into<String>) -> Self {
        Self {
            rule,
            query: query.into(),
        }
    }
}

/// Metrics backend (Prometheus) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricsBackendError {
    #[error("Prometheus returned {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid PromQL syntax: {message}")]
    InvalidSyntax { message: String },

    #[error("PromQL type error: {message}. Check that operations are between compatible types.")]
    TypeMismatch { message: String },

    #[error("PromQL syntax error: {message}. Check query structure and operators.")]
    UnexpectedToken { message: String },

    #[error("Prometheus query timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to reach Prometheus: {reason}")]
    Unreachable { reason: String },

    #[error("Invalid response from Prometheus: {reason}")]
    InvalidResponse { reason: String },
}

impl MetricsBackendError {
    /// Map an error string reported by Prometheus to the closest variant.
    pub fn from_prometheus_message(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("parse error") {
            Self::InvalidSyntax { message }
        } else if message.contains("binary expression") {
            Self::TypeMismatch { message }
        } else if message.contains("unexpected") {
            Self::UnexpectedToken { message }
        } else {
            Self::RequestFailed { status, message }
        }
    }

    /// True when the query itself was rejected, as opposed to the backend failing.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSyntax { .. } | Self::TypeMismatch { .. } | Self::UnexpectedToken { .. }
        )
    }
}

/// Terminal outcome of a generation run that did not produce a query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation backend is not configured. Please set GEMINI_API_KEY.")]
    NotConfigured,

    #[error("No generation candidates configured")]
    NoCandidates,

    #[error("Invalid API key for the generation backend. The key may be incorrect, expired, or lack the required permissions.")]
    Authentication { candidate: String, detail: String },

    #[error("Generation API quota exceeded. Please try again later.")]
    QuotaExhausted { candidate: String, detail: String },

    #[error("All generation candidates are currently overloaded. Please try again in a few moments. Attempted: {}", .attempted.join(", "))]
    Overloaded { attempted: Vec<String> },

    #[error("Every candidate produced an invalid query. Last failure: {}", .violation.rule.description())]
    SyntaxExhausted {
        attempted: Vec<String>,
        violation: SyntaxViolation,
    },

    #[error("Failed to generate PromQL after trying {} candidate(s): {detail}", .attempted.len())]
    Exhausted {
        attempted: Vec<String>,
        detail: String,
    },

    #[error("The request is too vague or out of scope to generate a safe PromQL query. Please name a metric (e.g. CPU, memory, disk, network) and an optional time window.")]
    NoAnswer { candidate: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all SEXTANT errors.
#[derive(Debug, Clone, Error)]
pub enum SextantError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxViolation),

    #[error("Metrics backend error: {0}")]
    MetricsBackend(#[from] MetricsBackendError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for SEXTANT operations.
pub type SextantResult<T> = Result<T, SextantError>;

// =============================================================================
// TESTS
// =============================================================================
