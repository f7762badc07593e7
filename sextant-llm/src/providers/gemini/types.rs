//! Gemini `generateContent` request and response types

use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

/// Sampling parameters. The defaults keep output close to deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub candidate_count: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.15,
            top_p: 0.9,
            top_k: 40,
            candidate_count: 1,
        }
    }
}

impl GenerateContentRequest {
    /// Single-turn user prompt.
    pub fn from_prompt(prompt: &str, generation_config: GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config,
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl ErrorDetail {
    /// Message with the status name appended, so markers like
    /// `PERMISSION_DENIED` or `API_KEY_INVALID` stay visible.
    pub fn describe(&self) -> String {
        let reasons: Vec<&str> = self
            .details
            .iter()
            .filter_map(|d| d.get("reason").and_then(|r| r.as_str()))
            .collect();

        let mut out = self.message.clone();
        if let Some(status) = &self.status {
            out.push_str(&format!(" ({})", status));
        }
        if !reasons.is_empty() {
            out.push_str(&format!(" [{}]", reasons.join(", ")));
        }
        out
    }

    /// `RetryInfo.retryDelay` in milliseconds, e.g. `"13s"` or `"1.5s"`.
    pub fn retry_delay_ms(&self) -> Option<i64> {
        self.details
            .iter()
            .filter_map(|d| d.get("retryDelay").and_then(|r| r.as_str()))
            .find_map(parse_duration_ms)
    }
}

/// Parse a protobuf JSON duration (`"13s"`, `"0.250s"`) into milliseconds.
pub fn parse_duration_ms(value: &str) -> Option<i64> {
    let seconds: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1000.0).round() as i64)
}
