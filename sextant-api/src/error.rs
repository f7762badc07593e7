//! Error Types for SEXTANT API
//!
//! This module defines error handling for the API layer:
//! - `ErrorCode` categorizes every rejection and maps it to an HTTP status
//! - `ApiError` carries the code, a message and optional details
//! - `IntoResponse` renders the `{"success": false, "error": {...}}` envelope
//!
//! Library errors are converted here. Anything that came from a backend is
//! passed through credential redaction before it reaches a response body.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sextant_core::{redact_credentials, GenerationError, MetricsBackendError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Translation Rejections (422)
    // ========================================================================
    /// Request names no metric or is a single word
    LowIntent,

    /// The generation backend declined to answer
    NoAnswer,

    /// Every candidate produced a query that failed syntax screening
    SyntaxViolation,

    /// The query references metrics the backend does not have
    UnknownMetrics,

    // ========================================================================
    // Generation Backend Errors
    // ========================================================================
    /// Credentials were rejected by the generation backend
    AiAuthFailed,

    /// Generation backend quota is used up
    AiQuotaExceeded,

    /// Every candidate was overloaded or unavailable
    AiOverloaded,

    /// Generation failed for any other reason
    GenerationFailed,

    /// No generation backend credentials are configured
    NotConfigured,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Request body or parameters failed validation
    ValidationError,

    /// Route does not exist
    NotFound,

    /// Too many requests from this client
    RateLimitExceeded,

    // ========================================================================
    // Metrics Backend Errors
    // ========================================================================
    /// Prometheus rejected the query
    PrometheusQueryError,

    /// Prometheus did not answer in time
    PrometheusTimeout,

    /// Prometheus is unreachable or answered with garbage
    PrometheusUnavailable,

    // ========================================================================
    // Server Errors
    // ========================================================================
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::LowIntent
            | ErrorCode::NoAnswer
            | ErrorCode::SyntaxViolation
            | ErrorCode::UnknownMetrics => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::AiAuthFailed => StatusCode::UNAUTHORIZED,

            ErrorCode::AiQuotaExceeded | ErrorCode::RateLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }

            ErrorCode::AiOverloaded | ErrorCode::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::ValidationError | ErrorCode::PrometheusQueryError => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::PrometheusTimeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::PrometheusUnavailable => StatusCode::BAD_GATEWAY,

            ErrorCode::GenerationFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::LowIntent => sextant_core::LOW_INTENT_MESSAGE,
            ErrorCode::NoAnswer => "The request could not be mapped to a PromQL query",
            ErrorCode::SyntaxViolation => "Generated query failed syntax validation",
            ErrorCode::UnknownMetrics => "Generated query references unknown metrics",
            ErrorCode::AiAuthFailed => "Generation backend rejected the configured credentials",
            ErrorCode::AiQuotaExceeded => "Generation API quota exceeded. Please try again later.",
            ErrorCode::AiOverloaded => "All generation candidates are currently overloaded",
            ErrorCode::GenerationFailed => "Failed to generate a PromQL query",
            ErrorCode::NotConfigured => "Generation backend is not configured",
            ErrorCode::ValidationError => "Validation failed",
            ErrorCode::NotFound => "Route not found",
            ErrorCode::RateLimitExceeded => "Too many requests, please try again later.",
            ErrorCode::PrometheusQueryError => "Prometheus rejected the query",
            ErrorCode::PrometheusTimeout => "Prometheus query timed out",
            ErrorCode::PrometheusUnavailable => "Prometheus is unavailable",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, unknown metrics, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn low_intent() -> Self {
        Self::from_code(ErrorCode::LowIntent)
    }

    /// Create a ValidationError with per-field details.
    pub fn validation(message: impl Into<String>, fields: Vec<FieldError>) -> Self {
        let error = Self::new(ErrorCode::ValidationError, message);
        if fields.is_empty() {
            error
        } else {
            error.with_details(json!(fields))
        }
    }

    /// Create a ValidationError for a single field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::validation(
            "Validation failed",
            vec![FieldError::new(field, message)],
        )
    }

    pub fn not_found(method: &str, path: &str) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("Route {} {} not found", method, path),
        )
    }

    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self::from_code(ErrorCode::RateLimitExceeded)
            .with_details(json!({ "retryAfterSeconds": retry_after_secs }))
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create an UNKNOWN_METRICS rejection.
    pub fn unknown_metrics(unknown: &[String], known: &[String]) -> Self {
        Self::new(
            ErrorCode::UnknownMetrics,
            format!(
                "Generated query references unknown metric(s): {}",
                unknown.join(", ")
            ),
        )
        .with_details(json!({
            "unknown": unknown,
            "known": known,
            "suggestion": UNKNOWN_METRICS_SUGGESTION,
        }))
    }
}

/// Hint attached to UNKNOWN_METRICS rejections.
pub const UNKNOWN_METRICS_SUGGESTION: &str = "Try rephrasing with CPU, memory, disk, or network terms. Example: \"CPU usage last 15 minutes\".";

/// One failed field in a validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    message: &'a str,
    code: ErrorCode,
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    /// The JSON body this error renders to.
    pub fn to_envelope(&self) -> serde_json::Value {
        let envelope = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                message: &self.message,
                code: self.code,
                status_code: self.status_code().as_u16(),
                details: self.details.as_ref(),
            },
        };
        serde_json::to_value(envelope).unwrap_or_else(|_| {
            json!({
                "success": false,
                "error": {
                    "message": self.message,
                    "code": "INTERNAL_ERROR",
                    "statusCode": 500,
                }
            })
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
        } else {
            tracing::warn!(code = %self.code, message = %self.message, "Request rejected");
        }
        (status, Json(self.to_envelope())).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM LIBRARY ERRORS
// ============================================================================

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        let message = redact_credentials(&err.to_string());
        match err {
            GenerationError::NotConfigured => ApiError::new(ErrorCode::NotConfigured, message),
            GenerationError::NoCandidates => ApiError::new(ErrorCode::NotConfigured, message),
            GenerationError::Authentication { candidate, .. } => {
                ApiError::new(ErrorCode::AiAuthFailed, message)
                    .with_details(json!({ "candidate": candidate }))
            }
            GenerationError::QuotaExhausted { candidate, .. } => {
                ApiError::new(ErrorCode::AiQuotaExceeded, message)
                    .with_details(json!({ "candidate": candidate }))
            }
            GenerationError::Overloaded { attempted } => {
                ApiError::new(ErrorCode::AiOverloaded, message)
                    .with_details(json!({ "attempted": attempted }))
            }
            GenerationError::SyntaxExhausted {
                attempted,
                violation,
            } => ApiError::new(ErrorCode::SyntaxViolation, message).with_details(json!({
                "rule": violation.rule,
                "attempted": attempted,
            })),
            GenerationError::Exhausted { attempted, .. } => {
                ApiError::new(ErrorCode::GenerationFailed, message)
                    .with_details(json!({ "attempted": attempted }))
            }
            GenerationError::NoAnswer { .. } => ApiError::new(ErrorCode::NoAnswer, message),
        }
    }
}

impl From<MetricsBackendError> for ApiError {
    fn from(err: MetricsBackendError) -> Self {
        let message = redact_credentials(&err.to_string());
        let code = match &err {
            MetricsBackendError::InvalidSyntax { .. }
            | MetricsBackendError::TypeMismatch { .. }
            | MetricsBackendError::UnexpectedToken { .. } => ErrorCode::PrometheusQueryError,
            MetricsBackendError::RequestFailed { status, .. } if (400..500).contains(status) => {
                ErrorCode::PrometheusQueryError
            }
            MetricsBackendError::Timeout { .. } => ErrorCode::PrometheusTimeout,
            MetricsBackendError::RequestFailed { .. }
            | MetricsBackendError::Unreachable { .. }
            | MetricsBackendError::InvalidResponse { .. } => ErrorCode::PrometheusUnavailable,
        };
        ApiError::new(code, message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(
            "Validation failed",
            vec![FieldError::new("body", rejection.body_text())],
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(
            "Invalid query parameters",
            vec![FieldError::new("query", rejection.body_text())],
        )
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
