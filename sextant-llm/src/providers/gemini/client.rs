//! Gemini REST client

use super::types::{ApiError, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::candidate::GenerationCandidate;
use crate::GenerationBackend;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use sextant_core::{redact_credentials, LlmError};
use std::time::Duration;

const PROVIDER: &str = "gemini";

/// Default REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Connection settings for the Gemini API.
#[derive(Clone)]
pub struct GeminiConfig {
    /// `None` leaves the backend unconfigured; every call then fails fast.
    pub api_key: Option<String>,
    pub base_url: String,
    pub generation: GenerationConfig,
    /// Transport-level ceiling. The orchestrator applies its own per-attempt
    /// timeout on top.
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            generation: GenerationConfig::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Read `GEMINI_API_KEY` and `SEXTANT_GEMINI_BASE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::new(std::env::var("GEMINI_API_KEY").ok());
        if let Some(base_url) = std::env::var("SEXTANT_GEMINI_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
        {
            config.base_url = base_url;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("generation", &self.generation)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.config.base_url, model)
    }

    /// Call one model and return its raw text.
    pub async fn generate_content(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(LlmError::ProviderNotConfigured);
        };

        let body = GenerateContentRequest::from_prompt(prompt, self.config.generation.clone());
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, self.config.request_timeout))?;

        let status = response.status();
        if status.is_success() {
            let parsed: GenerateContentResponse =
                response.json().await.map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: format!("Failed to parse response: {}", e),
                })?;

            return parsed.text().ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: empty_reason(&parsed),
            });
        }

        let header_retry_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let parsed = serde_json::from_str::<ApiError>(&error_text).ok();
        let message = redact_credentials(
            &parsed
                .as_ref()
                .map(|e| e.error.describe())
                .unwrap_or(error_text),
        );

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after_ms: parsed
                    .as_ref()
                    .and_then(|e| e.error.retry_delay_ms())
                    .or(header_retry_ms)
                    .unwrap_or(0),
                message,
            },
            _ => LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            },
        })
    }
}

fn transport_error(e: &reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            provider: PROVIDER.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        LlmError::Network {
            provider: PROVIDER.to_string(),
            reason: redact_credentials(&format!("network error: {}", e)),
        }
    }
}

fn empty_reason(response: &GenerateContentResponse) -> String {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return format!("prompt blocked ({})", reason);
    }
    match response
        .candidates
        .first()
        .and_then(|c| c.finish_reason.as_deref())
    {
        Some(reason) => format!("empty answer (finish reason {})", reason),
        None => "no candidates in response".to_string(),
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(
        &self,
        candidate: &GenerationCandidate,
        prompt: &str,
    ) -> Result<String, LlmError> {
        self.generate_content(&candidate.id, prompt).await
    }

    fn backend_id(&self) -> &str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.config.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_unconfigured() {
        assert!(!GeminiConfig::new(None).is_configured());
        assert!(!GeminiConfig::new(Some("  ".to_string())).is_configured());
        assert!(GeminiConfig::new(Some("k".to_string())).is_configured());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = GeminiConfig::new(Some("AIzaSecretValue".to_string()));
        assert!(!format!("{:?}", config).contains("AIzaSecretValue"));
        let client = GeminiClient::new(config);
        assert!(!format!("{:?}", client).contains("AIzaSecretValue"));
    }

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new(
            GeminiConfig::new(Some("k".to_string())).with_base_url("http://localhost:8080/v1beta/"),
        );
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_fast() {
        let client = GeminiClient::new(GeminiConfig::new(None));
        let candidate = GenerationCandidate {
            id: "gemini-2.5-flash".to_string(),
            rank: 0,
        };
        assert_eq!(
            client.generate(&candidate, "prompt").await,
            Err(LlmError::ProviderNotConfigured)
        );
        assert!(!client.is_configured());
    }

    #[test]
    fn test_empty_reason() {
        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).expect("parse");
        assert_eq!(empty_reason(&blocked), "prompt blocked (SAFETY)");

        let none: GenerateContentResponse = serde_json::from_str("{}").expect("parse");
        assert_eq!(empty_reason(&none), "no candidates in response");
    }
}
