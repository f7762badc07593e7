//! Input sanitizing and the low-intent guard.
//!
//! Both run before any generation attempt is made.

use once_cell::sync::Lazy;
use regex::Regex;

/// Words that signal the request is about a measurable resource.
pub const METRIC_KEYWORDS: &[&str] = &[
    "cpu",
    "processor",
    "core",
    "memory",
    "ram",
    "disk",
    "io",
    "network",
    "nic",
    "traffic",
    "latency",
    "errors",
    "requests",
    "throughput",
    "bytes",
    "read",
    "write",
    "usage",
    "utilization",
    "availability",
    "uptime",
];

/// Message returned when the guard rejects a request.
pub const LOW_INTENT_MESSAGE: &str = "Your request is too vague. Please mention a metric and optional time/window (e.g., \"CPU usage 15m\", \"network traffic by interface\", \"memory available\").";

static WORD_SPLIT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").ok());

static STATEMENT_INJECTION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i);\s*(?:drop|delete|update)").ok());

/// True when the request cannot be acted on: one word or fewer, or no
/// metric keyword at all.
pub fn is_low_intent(input: &str) -> bool {
    let lowered = input.to_lowercase();
    let words: Vec<&str> = match WORD_SPLIT.as_ref() {
        Some(re) => re.split(&lowered).filter(|w| !w.is_empty()).collect(),
        None => lowered.split_whitespace().collect(),
    };

    if words.len() <= 1 {
        return true;
    }

    !words.iter().any(|word| METRIC_KEYWORDS.contains(word))
}

/// Strip markup and statement-injection fragments from free text.
pub fn sanitize_input(input: &str) -> String {
    let without_markup: String = input.chars().filter(|c| *c != '<' && *c != '>').collect();
    let cleaned = match STATEMENT_INJECTION.as_ref() {
        Some(re) => re.replace_all(&without_markup, "").into_owned(),
        None => without_markup,
    };
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_word_is_low_intent() {
        assert!(is_low_intent("hello"));
        assert!(is_low_intent("cpu"));
        assert!(is_low_intent(""));
    }

    #[test]
    fn test_no_keyword_is_low_intent() {
        assert!(is_low_intent("tell me a joke"));
        assert!(is_low_intent("what is the weather"));
    }

    #[test]
    fn test_keyword_requests_pass() {
        assert!(!is_low_intent("CPU usage for the last 15 minutes"));
        assert!(!is_low_intent("network traffic by interface"));
        assert!(!is_low_intent("disk read rate"));
        assert!(!is_low_intent("memory, available?"));
    }

    #[test]
    fn test_sanitize_input() {
        assert_eq!(sanitize_input("  <b>CPU</b> usage "), "bCPU/b usage");
        assert_eq!(sanitize_input("cpu usage; DROP table"), "cpu usage table");
        assert_eq!(sanitize_input("cpu;delete"), "cpu");
        assert_eq!(sanitize_input("memory usage"), "memory usage");
    }
}
