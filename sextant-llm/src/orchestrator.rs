//! Candidate fallback orchestration.
//!
//! Candidates are tried strictly in priority order. Each raw answer is
//! screened by the PromQL syntax validator; a failure is classified by the
//! [`RetryPolicy`] and either advances to the next candidate or ends the run.

use crate::candidate::GenerationCandidate;
use crate::classify::{is_authentication_text, is_overloaded_text, FailureClass, RetryPolicy};
use crate::prompt::build_prompt;
use crate::GenerationBackend;
use serde::Serialize;
use sextant_core::{
    redact_credentials, screen, GenerationError, LlmError, Screened, SyntaxViolation,
    ValidatedQuery,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ============================================================================
// STATE
// ============================================================================

/// Where a run is in the candidate walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Pending,
    /// Calling the candidate at this index
    Attempting(usize),
    Succeeded,
    /// Terminal failure, either by exhaustion or by a stop-class failure
    ExhaustedFailed,
}

impl OrchestratorState {
    /// First state of a run over `total` candidates.
    pub fn start(total: usize) -> Self {
        if total == 0 {
            OrchestratorState::ExhaustedFailed
        } else {
            OrchestratorState::Attempting(0)
        }
    }

    /// Transition after an attempt at the current index finished.
    pub fn next(self, outcome: &AttemptOutcome, total: usize) -> Self {
        match self {
            OrchestratorState::Pending => Self::start(total),
            OrchestratorState::Attempting(i) => match outcome {
                AttemptOutcome::Accepted => OrchestratorState::Succeeded,
                o if o.allows_fallback() && i + 1 < total => OrchestratorState::Attempting(i + 1),
                _ => OrchestratorState::ExhaustedFailed,
            },
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Succeeded | OrchestratorState::ExhaustedFailed
        )
    }
}

// ============================================================================
// ATTEMPTS
// ============================================================================

/// Outcome of calling one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    /// The candidate answered with the no-answer sentinel.
    NoAnswer,
    /// The candidate answered but the text failed syntax screening.
    SyntaxRejected(SyntaxViolation),
    /// The backend call failed.
    Failed(FailureClass),
}

impl AttemptOutcome {
    /// Syntax rejections count as retryable.
    pub fn allows_fallback(&self) -> bool {
        match self {
            AttemptOutcome::SyntaxRejected(_) => true,
            AttemptOutcome::Failed(class) => class.allows_fallback(),
            AttemptOutcome::Accepted | AttemptOutcome::NoAnswer => false,
        }
    }

    /// Stable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Accepted => "accepted",
            AttemptOutcome::NoAnswer => "no_answer",
            AttemptOutcome::SyntaxRejected(_) => "syntax_rejected",
            AttemptOutcome::Failed(class) => class.as_str(),
        }
    }
}

/// Record of one candidate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub candidate: String,
    pub outcome: AttemptOutcome,
    /// Failure detail with credentials redacted
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// A query one candidate produced and the validator accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub query: ValidatedQuery,
    pub candidate: String,
    /// Attempts made, including the successful one
    pub attempts: usize,
}

/// Everything a run did, for callers that record per-attempt telemetry.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub attempts: Vec<GenerationAttempt>,
    pub state: OrchestratorState,
    pub outcome: Result<GeneratedQuery, GenerationError>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Drives the candidate list against one generation backend.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    policy: RetryPolicy,
}

impl GenerationOrchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend_id(&self) -> &str {
        self.backend.backend_id()
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    /// Generate a validated query for `request_text`.
    pub async fn generate(&self, request_text: &str) -> Result<GeneratedQuery, GenerationError> {
        self.run(request_text).await.outcome
    }

    /// Walk the candidates and keep the full attempt history.
    pub async fn run(&self, request_text: &str) -> GenerationRun {
        if !self.backend.is_configured() {
            return GenerationRun {
                attempts: Vec::new(),
                state: OrchestratorState::ExhaustedFailed,
                outcome: Err(GenerationError::NotConfigured),
            };
        }

        let candidates = self.policy.candidates();
        let total = candidates.len();
        let prompt = build_prompt(request_text);
        let mut attempts: Vec<GenerationAttempt> = Vec::with_capacity(total);
        let mut state = OrchestratorState::start(total);

        while let OrchestratorState::Attempting(index) = state {
            let Some(candidate) = candidates.get(index) else {
                state = OrchestratorState::ExhaustedFailed;
                break;
            };

            info!(
                candidate = %candidate.id,
                attempt = index + 1,
                total,
                "Converting request to PromQL"
            );

            let started = Instant::now();
            let (outcome, detail, accepted) = self.attempt(candidate, &prompt).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            state = state.next(&outcome, total);
            match &outcome {
                AttemptOutcome::Accepted => {
                    info!(candidate = %candidate.id, elapsed_ms, "Generated PromQL");
                }
                AttemptOutcome::NoAnswer => {
                    info!(candidate = %candidate.id, "Candidate declined to answer");
                }
                other if other.allows_fallback() => {
                    warn!(
                        candidate = %candidate.id,
                        attempt = index + 1,
                        outcome = other.label(),
                        error = detail.as_deref().unwrap_or_default(),
                        will_retry = !state.is_terminal(),
                        "Candidate attempt failed"
                    );
                }
                other => {
                    error!(
                        candidate = %candidate.id,
                        outcome = other.label(),
                        error = detail.as_deref().unwrap_or_default(),
                        "Non-recoverable generation failure, stopping fallback"
                    );
                }
            }

            attempts.push(GenerationAttempt {
                candidate: candidate.id.clone(),
                outcome,
                detail,
                elapsed_ms,
            });

            if let Some(query) = accepted {
                let count = attempts.len();
                return GenerationRun {
                    attempts,
                    state,
                    outcome: Ok(GeneratedQuery {
                        query,
                        candidate: candidate.id.clone(),
                        attempts: count,
                    }),
                };
            }
        }

        let err = terminal_error(&attempts);
        if !attempts.is_empty() {
            error!(
                attempted = %attempted_ids(&attempts).join(", "),
                error = %err,
                "Failed to convert request to PromQL"
            );
        }
        GenerationRun {
            attempts,
            state,
            outcome: Err(err),
        }
    }

    async fn attempt(
        &self,
        candidate: &GenerationCandidate,
        prompt: &str,
    ) -> (AttemptOutcome, Option<String>, Option<ValidatedQuery>) {
        let timeout = self.policy.attempt_timeout();
        let raw = match tokio::time::timeout(timeout, self.backend.generate(candidate, prompt)).await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return self.failed(&e),
            Err(_) => {
                let e = LlmError::Timeout {
                    provider: self.backend.backend_id().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                return self.failed(&e);
            }
        };

        match screen(&raw) {
            Ok(Screened::Query(query)) => (AttemptOutcome::Accepted, None, Some(query)),
            Ok(Screened::NoAnswer) => (AttemptOutcome::NoAnswer, None, None),
            Err(violation) => {
                debug!(rule = %violation.rule, query = %violation.query, "Syntax screening rejected candidate output");
                let detail = format!("{}. Generated query: {}", violation, violation.query);
                (
                    AttemptOutcome::SyntaxRejected(violation),
                    Some(redact_credentials(&detail)),
                    None,
                )
            }
        }
    }

    fn failed(&self, error: &LlmError) -> (AttemptOutcome, Option<String>, Option<ValidatedQuery>) {
        let class = self.policy.classify(error);
        (
            AttemptOutcome::Failed(class),
            Some(redact_credentials(&error.to_string())),
            None,
        )
    }
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("backend", &self.backend.backend_id())
            .field("policy", &self.policy)
            .finish()
    }
}

fn attempted_ids(attempts: &[GenerationAttempt]) -> Vec<String> {
    attempts.iter().map(|a| a.candidate.clone()).collect()
}

/// Summarise a failed run from its last attempt.
///
/// Priority: authentication, quota, all-overloaded, syntax rejection after
/// exhaustion, then the generic failure.
pub fn terminal_error(attempts: &[GenerationAttempt]) -> GenerationError {
    let Some(last) = attempts.last() else {
        return GenerationError::NoCandidates;
    };
    let attempted = attempted_ids(attempts);
    let detail = last.detail.clone().unwrap_or_default();
    let lowered = detail.to_lowercase();

    match &last.outcome {
        AttemptOutcome::NoAnswer => GenerationError::NoAnswer {
            candidate: last.candidate.clone(),
        },
        AttemptOutcome::Failed(class)
            if *class == FailureClass::Authentication || is_authentication_text(&detail) =>
        {
            GenerationError::Authentication {
                candidate: last.candidate.clone(),
                detail,
            }
        }
        AttemptOutcome::Failed(class)
            if *class == FailureClass::QuotaExhausted || lowered.contains("quota") =>
        {
            GenerationError::QuotaExhausted {
                candidate: last.candidate.clone(),
                detail,
            }
        }
        AttemptOutcome::Failed(_) if is_overloaded_text(&lowered) => {
            GenerationError::Overloaded { attempted }
        }
        AttemptOutcome::SyntaxRejected(violation) => GenerationError::SyntaxExhausted {
            attempted,
            violation: violation.clone(),
        },
        _ => GenerationError::Exhausted { attempted, detail },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateList;
    use async_trait::async_trait;
    use sextant_core::SyntaxRule;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays one scripted reply per call and records who was asked.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<Vec<String>>,
        configured: bool,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
                configured: true,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        async fn generate(
            &self,
            candidate: &GenerationCandidate,
            _prompt: &str,
        ) -> Result<String, LlmError> {
            self.calls.lock().expect("calls lock").push(candidate.id.clone());
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Err(LlmError::ProviderNotConfigured))
        }

        fn backend_id(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    /// Never answers within any reasonable timeout.
    struct Stalled;

    #[async_trait]
    impl GenerationBackend for Stalled {
        async fn generate(&self, _: &GenerationCandidate, _: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("up".to_string())
        }

        fn backend_id(&self) -> &str {
            "stalled"
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn overloaded() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 503,
            message: "The model is overloaded. Please try again later.".to_string(),
        }
    }

    fn orchestrator(backend: Arc<dyn GenerationBackend>, ids: &[&str]) -> GenerationOrchestrator {
        GenerationOrchestrator::new(backend, RetryPolicy::new(CandidateList::new(ids.iter())))
    }

    #[tokio::test]
    async fn test_first_candidate_success() {
        let backend = Scripted::new(vec![Ok("rate(node_cpu_seconds_total[5m])".to_string())]);
        let orch = orchestrator(backend.clone(), &["a", "b"]);

        let run = orch.run("cpu usage").await;
        let generated = run.outcome.expect("should succeed");
        assert_eq!(generated.candidate, "a");
        assert_eq!(generated.attempts, 1);
        assert_eq!(generated.query.as_str(), "rate(node_cpu_seconds_total[5m])");
        assert_eq!(run.state, OrchestratorState::Succeeded);
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_overloaded_falls_back_to_next_candidate() {
        let backend = Scripted::new(vec![
            Err(overloaded()),
            Ok("node_memory_MemAvailable_bytes".to_string()),
        ]);
        let orch = orchestrator(backend.clone(), &["a", "b", "c"]);

        let run = orch.run("memory available").await;
        let generated = run.outcome.expect("should succeed");
        assert_eq!(generated.candidate, "b");
        assert_eq!(generated.attempts, 2);
        assert_eq!(run.attempts[0].outcome, AttemptOutcome::Failed(FailureClass::Retryable));
        assert_eq!(run.attempts[1].outcome, AttemptOutcome::Accepted);
        assert_eq!(backend.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_syntax_rejection_is_retryable() {
        let backend = Scripted::new(vec![
            Ok("rate(x_total[5m]) by [nic]".to_string()),
            Ok("sum by (nic) (rate(x_total[5m]))".to_string()),
        ]);
        let orch = orchestrator(backend, &["a", "b"]);

        let run = orch.run("network by interface").await;
        assert!(matches!(
            run.attempts[0].outcome,
            AttemptOutcome::SyntaxRejected(_)
        ));
        assert_eq!(
            run.outcome.expect("second candidate succeeds").query.as_str(),
            "sum by (nic) (rate(x_total[5m]))"
        );
    }

    #[tokio::test]
    async fn test_authentication_stops_immediately() {
        let backend = Scripted::new(vec![
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                status: 400,
                message: "API key not valid. Please pass a valid API key.".to_string(),
            }),
            Ok("up".to_string()),
        ]);
        let orch = orchestrator(backend.clone(), &["a", "b", "c"]);

        let run = orch.run("cpu usage").await;
        assert!(matches!(
            run.outcome,
            Err(GenerationError::Authentication { .. })
        ));
        assert_eq!(run.state, OrchestratorState::ExhaustedFailed);
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_quota_stops_immediately() {
        let backend = Scripted::new(vec![Err(LlmError::RateLimited {
            provider: "scripted".to_string(),
            retry_after_ms: 0,
            message: "You exceeded your current quota".to_string(),
        })]);
        let orch = orchestrator(backend.clone(), &["a", "b"]);

        let run = orch.run("cpu usage").await;
        assert!(matches!(
            run.outcome,
            Err(GenerationError::QuotaExhausted { .. })
        ));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_stops_with_generic_error() {
        let backend = Scripted::new(vec![Err(LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 400,
            message: "Request contains an invalid argument.".to_string(),
        })]);
        let orch = orchestrator(backend.clone(), &["a", "b"]);

        let err = orch.generate("cpu usage").await.expect_err("should fail");
        match err {
            GenerationError::Exhausted { attempted, detail } => {
                assert_eq!(attempted, vec!["a"]);
                assert!(detail.contains("invalid argument"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_answer_short_circuits() {
        let backend = Scripted::new(vec![Ok("NONE".to_string()), Ok("up".to_string())]);
        let orch = orchestrator(backend.clone(), &["a", "b"]);

        let run = orch.run("tell me a joke about cpu").await;
        assert!(matches!(run.outcome, Err(GenerationError::NoAnswer { .. })));
        assert_eq!(run.attempts.len(), 1);
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_all_overloaded() {
        let backend = Scripted::new(vec![Err(overloaded()), Err(overloaded())]);
        let orch = orchestrator(backend, &["a", "b"]);

        match orch.generate("cpu usage").await {
            Err(GenerationError::Overloaded { attempted }) => {
                assert_eq!(attempted, vec!["a", "b"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_syntax_exhausted_when_last_attempt_was_invalid() {
        let backend = Scripted::new(vec![
            Err(overloaded()),
            Ok("sum(rate(x_total[5m])".to_string()),
        ]);
        let orch = orchestrator(backend, &["a", "b"]);

        match orch.generate("cpu usage").await {
            Err(GenerationError::SyntaxExhausted { attempted, violation }) => {
                assert_eq!(attempted.len(), 2);
                assert_eq!(violation.rule, SyntaxRule::UnbalancedDelimiters);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_configured_makes_no_attempts() {
        let backend = Arc::new(Scripted {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            configured: false,
        });
        let orch = orchestrator(backend.clone(), &["a"]);

        let run = orch.run("cpu usage").await;
        assert!(matches!(run.outcome, Err(GenerationError::NotConfigured)));
        assert!(run.attempts.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let backend = Scripted::new(vec![]);
        let orch = orchestrator(backend, &[]);
        assert!(matches!(
            orch.generate("cpu usage").await,
            Err(GenerationError::NoCandidates)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retryable() {
        let orch = GenerationOrchestrator::new(
            Arc::new(Stalled),
            RetryPolicy::new(CandidateList::new(["a", "b"]))
                .with_attempt_timeout(Duration::from_millis(50)),
        );

        let run = orch.run("cpu usage").await;
        assert_eq!(run.attempts.len(), 2);
        assert!(run
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::Failed(FailureClass::Retryable)));
        assert!(matches!(run.outcome, Err(GenerationError::Exhausted { .. })));
    }

    #[test]
    fn test_failure_detail_is_redacted() {
        let attempt = GenerationAttempt {
            candidate: "a".to_string(),
            outcome: AttemptOutcome::Failed(FailureClass::Fatal),
            detail: Some(redact_credentials(
                "error sending request for url (https://host/models/a:generateContent?key=AIzaSyD-0123456789abcdefghijk)",
            )),
            elapsed_ms: 1,
        };
        let err = terminal_error(&[attempt]);
        assert!(!format!("{err}").contains("AIzaSyD"));
    }

    #[test]
    fn test_terminal_priority_auth_over_overloaded_text() {
        let attempt = GenerationAttempt {
            candidate: "a".to_string(),
            outcome: AttemptOutcome::Failed(FailureClass::Fatal),
            detail: Some("503 overloaded; API key expired".to_string()),
            elapsed_ms: 1,
        };
        assert!(matches!(
            terminal_error(&[attempt]),
            GenerationError::Authentication { .. }
        ));
    }

    #[test]
    fn test_state_transitions() {
        use OrchestratorState::*;
        let retry = AttemptOutcome::Failed(FailureClass::Retryable);
        let stop = AttemptOutcome::Failed(FailureClass::Authentication);

        assert_eq!(Pending.next(&retry, 0), ExhaustedFailed);
        assert_eq!(Pending.next(&retry, 3), Attempting(0));
        assert_eq!(Attempting(0).next(&retry, 3), Attempting(1));
        assert_eq!(Attempting(2).next(&retry, 3), ExhaustedFailed);
        assert_eq!(Attempting(0).next(&stop, 3), ExhaustedFailed);
        assert_eq!(Attempting(1).next(&AttemptOutcome::Accepted, 3), Succeeded);
        assert_eq!(Attempting(0).next(&AttemptOutcome::NoAnswer, 3), ExhaustedFailed);
        assert_eq!(Succeeded.next(&retry, 3), Succeeded);
    }
}
