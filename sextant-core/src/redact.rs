//! Credential redaction for upstream error text.
//!
//! Anything that reaches a log line or a response body from a backend error
//! goes through [`redact_credentials`] first.

use once_cell::sync::Lazy;
use regex::Regex;

/// Replacement marker for redacted values.
pub const REDACTED: &str = "[REDACTED]";

static CREDENTIAL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // key=value and key: value pairs
        (
            r#"(?i)\b((?:x-goog-)?api[_-]?key|access[_-]?token|token|secret|password|credential|authorization)s?(["']?\s*[=:]\s*["']?)(?:bearer\s+)?[^"'\s&,;]+"#,
            "${1}${2}[REDACTED]",
        ),
        // query string credentials
        (r#"(?i)([?&](?:key|api_key|token)=)[^&\s"']+"#, "${1}[REDACTED]"),
        (r"(?i)\bbearer\s+[a-z0-9._~+/\-]+=*", "Bearer [REDACTED]"),
        // Google API keys
        (r"\bAIza[0-9A-Za-z_\-]{20,}", "[REDACTED]"),
        // JWTs
        (
            r"\beyJ[a-zA-Z0-9_\-]+\.eyJ[a-zA-Z0-9_\-]+\.[a-zA-Z0-9_\-]+",
            "[REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Replace credential-shaped substrings with `[REDACTED]`.
pub fn redact_credentials(text: &str) -> String {
    CREDENTIAL_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}
