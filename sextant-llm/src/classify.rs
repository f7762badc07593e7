//! Failure classification and the retry policy driving candidate fallback.

use crate::candidate::CandidateList;
use serde::{Deserialize, Serialize};
use sextant_core::LlmError;
use std::time::Duration;

/// Per-attempt generation timeout used when none is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a failed candidate call means for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Try the next candidate.
    Retryable,
    /// The credential was rejected. Stop.
    Authentication,
    /// The account is out of quota. Stop.
    QuotaExhausted,
    /// Anything unrecognised. Stop.
    Fatal,
}

impl FailureClass {
    pub fn allows_fallback(&self) -> bool {
        matches!(self, FailureClass::Retryable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Retryable => "retryable",
            FailureClass::Authentication => "authentication",
            FailureClass::QuotaExhausted => "quota_exhausted",
            FailureClass::Fatal => "fatal",
        }
    }
}

/// Classifier signature used by [`RetryPolicy`].
pub type Classifier = fn(&LlmError) -> FailureClass;

fn status_of(error: &LlmError) -> Option<u16> {
    match error {
        LlmError::RequestFailed { status, .. } => Some(*status),
        LlmError::RateLimited { .. } => Some(429),
        _ => None,
    }
}

/// Auth markers. `API_KEY` and `API key` are matched case-sensitively the
/// way upstream messages spell them.
pub(crate) fn is_authentication_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    text.contains("API_KEY")
        || text.contains("API key")
        || lowered.contains("unauthorized")
        || lowered.contains("unauthenticated")
        || lowered.contains("permission denied")
        || lowered.contains("permission_denied")
        || lowered.contains("invalid api key")
}

pub(crate) fn is_overloaded_text(lowered: &str) -> bool {
    lowered.contains("503")
        || lowered.contains("service unavailable")
        || lowered.contains("overloaded")
}

fn is_authentication(error: &LlmError, text: &str) -> bool {
    matches!(status_of(error), Some(401) | Some(403)) || is_authentication_text(text)
}

fn is_quota(error: &LlmError, lowered: &str) -> bool {
    lowered.contains("quota exceeded")
        || (status_of(error) == Some(429) && lowered.contains("quota"))
}

fn is_candidate_missing(error: &LlmError, lowered: &str) -> bool {
    status_of(error) == Some(404)
        || lowered.contains("not found")
        || lowered.contains("not supported")
        || (lowered.contains("model") && lowered.contains("not available"))
}

fn is_retryable(error: &LlmError, lowered: &str) -> bool {
    match error {
        LlmError::Timeout { .. } | LlmError::Network { .. } | LlmError::RateLimited { .. } => {
            return true
        }
        LlmError::RequestFailed { status, .. } if matches!(*status, 500 | 502 | 503 | 504) => {
            return true
        }
        _ => {}
    }

    is_overloaded_text(lowered)
        || lowered.contains("try again later")
        || lowered.contains("rate limit")
        || lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("connection reset")
        || lowered.contains("dns error")
        || lowered.contains("network error")
        || is_candidate_missing(error, lowered)
}

/// Default classifier: authentication, then quota, then retryable, and
/// fatal for anything left.
pub fn classify_failure(error: &LlmError) -> FailureClass {
    let text = error.to_string();
    let lowered = text.to_lowercase();

    if is_authentication(error, &text) {
        FailureClass::Authentication
    } else if is_quota(error, &lowered) {
        FailureClass::QuotaExhausted
    } else if is_retryable(error, &lowered) {
        FailureClass::Retryable
    } else {
        FailureClass::Fatal
    }
}

/// Ordered candidates plus the rules deciding when to move to the next one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    candidates: CandidateList,
    classifier: Classifier,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(candidates: CandidateList) -> Self {
        Self {
            candidates,
            classifier: classify_failure,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn candidates(&self) -> &CandidateList {
        &self.candidates
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn classify(&self, error: &LlmError) -> FailureClass {
        (self.classifier)(error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(CandidateList::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(status: u16, message: &str) -> LlmError {
        LlmError::RequestFailed {
            provider: "gemini".to_string(),
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_overloaded_is_retryable() {
        assert_eq!(
            classify_failure(&failed(503, "The model is overloaded. Please try again later.")),
            FailureClass::Retryable
        );
        assert_eq!(
            classify_failure(&failed(500, "Internal error encountered.")),
            FailureClass::Retryable
        );
    }

    #[test]
    fn test_missing_model_is_retryable() {
        assert_eq!(
            classify_failure(&failed(
                404,
                "models/gemini-x is not found for API version v1beta"
            )),
            FailureClass::Retryable
        );
    }

    #[test]
    fn test_transport_failures_are_retryable() {
        let timeout = LlmError::Timeout {
            provider: "gemini".to_string(),
            timeout_ms: 30_000,
        };
        assert_eq!(classify_failure(&timeout), FailureClass::Retryable);

        let network = LlmError::Network {
            provider: "gemini".to_string(),
            reason: "connection reset by peer".to_string(),
        };
        assert_eq!(classify_failure(&network), FailureClass::Retryable);
    }

    #[test]
    fn test_rate_limit_without_quota_is_retryable() {
        let err = LlmError::RateLimited {
            provider: "gemini".to_string(),
            retry_after_ms: 1000,
            message: "Resource has been exhausted (e.g. check rate limit).".to_string(),
        };
        assert_eq!(classify_failure(&err), FailureClass::Retryable);
    }

    #[test]
    fn test_rate_limit_with_quota_is_quota_exhausted() {
        let err = LlmError::RateLimited {
            provider: "gemini".to_string(),
            retry_after_ms: 1000,
            message: "You exceeded your current quota, please check your plan.".to_string(),
        };
        assert_eq!(classify_failure(&err), FailureClass::QuotaExhausted);
        assert_eq!(
            classify_failure(&failed(400, "Quota exceeded for this project")),
            FailureClass::QuotaExhausted
        );
    }

    #[test]
    fn test_authentication_markers() {
        assert_eq!(
            classify_failure(&failed(400, "API key not valid. Please pass a valid API key.")),
            FailureClass::Authentication
        );
        assert_eq!(
            classify_failure(&failed(400, "reason: API_KEY_INVALID")),
            FailureClass::Authentication
        );
        assert_eq!(
            classify_failure(&failed(403, "Forbidden")),
            FailureClass::Authentication
        );
        assert_eq!(
            classify_failure(&failed(401, "Request had invalid authentication credentials")),
            FailureClass::Authentication
        );
    }

    #[test]
    fn test_authentication_beats_quota_and_retryable() {
        // Overloaded text plus an auth marker still stops immediately.
        assert_eq!(
            classify_failure(&failed(503, "overloaded; permission denied")),
            FailureClass::Authentication
        );
        // Quota beats retryable.
        let err = LlmError::RateLimited {
            provider: "gemini".to_string(),
            retry_after_ms: 0,
            message: "quota exceeded, rate limit".to_string(),
        };
        assert_eq!(classify_failure(&err), FailureClass::QuotaExhausted);
    }

    #[test]
    fn test_unrecognised_is_fatal() {
        assert_eq!(
            classify_failure(&failed(400, "Request contains an invalid argument.")),
            FailureClass::Fatal
        );
        assert_eq!(
            classify_failure(&LlmError::ProviderNotConfigured),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_policy_uses_custom_classifier() {
        fn always_fatal(_: &LlmError) -> FailureClass {
            FailureClass::Fatal
        }
        let policy = RetryPolicy::default()
            .with_classifier(always_fatal)
            .with_attempt_timeout(Duration::from_secs(5));
        assert_eq!(policy.classify(&failed(503, "overloaded")), FailureClass::Fatal);
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(policy.candidates().len(), 5);
    }
}
