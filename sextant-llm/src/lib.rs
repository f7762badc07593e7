//! SEXTANT LLM - Generation Backends and Candidate Fallback
//!
//! Defines the [`GenerationBackend`] trait every text-generation service
//! implements, the ordered candidate list, failure classification and the
//! orchestrator that walks candidates until one produces a query the
//! syntax validator accepts.

use async_trait::async_trait;
use sextant_core::LlmError;

pub mod candidate;
pub mod classify;
pub mod orchestrator;
pub mod prompt;
pub mod providers;

pub use candidate::{CandidateList, GenerationCandidate, DEFAULT_CANDIDATES};
pub use classify::{classify_failure, Classifier, FailureClass, RetryPolicy, DEFAULT_ATTEMPT_TIMEOUT};
pub use orchestrator::{
    terminal_error, AttemptOutcome, GeneratedQuery, GenerationAttempt, GenerationOrchestrator,
    GenerationRun, OrchestratorState,
};
pub use prompt::{build_prompt, PROMQL_INSTRUCTIONS};
pub use providers::{GeminiClient, GeminiConfig};

// ============================================================================
// GENERATION BACKEND TRAIT
// ============================================================================

/// A service that turns a prompt into raw text using a named candidate model.
///
/// Implementations must be thread-safe (Send + Sync). They return the text
/// untouched; screening and classification happen in the orchestrator.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Ask `candidate` to complete `prompt`.
    async fn generate(
        &self,
        candidate: &GenerationCandidate,
        prompt: &str,
    ) -> Result<String, LlmError>;

    /// Short identifier used in logs and errors (e.g. "gemini").
    fn backend_id(&self) -> &str;

    /// Whether credentials are present. An unconfigured backend is never called.
    fn is_configured(&self) -> bool;
}
