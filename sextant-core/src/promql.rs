//! PromQL Syntax Validation
//!
//! Screens raw generated text into a canonical single-line query. The checks
//! are a fixed, ordered set of known-bad shapes plus a structural walk over
//! delimiters. This is not a PromQL parser; it only rejects output that can
//! never execute.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::SyntaxViolation;
use crate::metrics::extract_metric_candidates;

/// Text a generation candidate returns when it declines to answer.
pub const NO_ANSWER_SENTINEL: &str = "NONE";

/// Shortest text that can be a query.
pub const MIN_QUERY_LEN: usize = 3;

/// Longest text accepted as a query. Anything longer is prose.
pub const MAX_QUERY_LEN: usize = 500;

/// Aggregation operators that take a grouping clause.
pub(crate) const AGGREGATION_OPERATORS: &[&str] = &[
    "sum",
    "avg",
    "min",
    "max",
    "count",
    "stddev",
    "stdvar",
    "topk",
    "bottomk",
    "quantile",
    "count_values",
    "group",
    "limitk",
    "limit_ratio",
];

// ============================================================================
// RULES
// ============================================================================

/// Grammar rule a candidate query can break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyntaxRule {
    /// Fewer than three characters after normalization
    EmptyQuery,
    /// `] by [`: a range selector used as a grouping clause
    RangeBeforeGrouping,
    /// `by [`: grouping written with range-selector brackets
    GroupingBeforeRange,
    /// `without [`: complement grouping written with brackets
    ComplementGroupingBrackets,
    /// `sum by (l) expr` without parentheses around the body
    AggregationBodyWithoutParens,
    /// Aggregation operator followed by neither `(` nor a grouping clause
    BareAggregation,
    /// `by`/`without` attached to something that is not an aggregation
    GroupingWithoutAggregation,
    /// Range selector used directly as an arithmetic operand
    RangeInArithmetic,
    /// A delimiter closes before it opens, or never closes, including a
    /// string literal left open
    UnbalancedDelimiters,
    /// No metric name or function call anywhere in the text
    MissingIdentifier,
    /// Too long to be a query
    ProseContamination,
}

impl SyntaxRule {
    /// Human-readable explanation, suitable for a corrective re-prompt.
    pub fn description(&self) -> &'static str {
        match self {
            SyntaxRule::EmptyQuery => "Generated query is empty or too short",
            SyntaxRule::RangeBeforeGrouping => {
                "Incorrect placement of \"by\" clause with square brackets"
            }
            SyntaxRule::GroupingBeforeRange => {
                "\"by\" must not be followed by square brackets. Use \"by (label)\" with an aggregation"
            }
            SyntaxRule::ComplementGroupingBrackets => {
                "\"without\" must be followed by parentheses (label), not square brackets"
            }
            SyntaxRule::AggregationBodyWithoutParens => {
                "Aggregation with a grouping clause must wrap its expression in parentheses"
            }
            SyntaxRule::BareAggregation => {
                "Aggregation operator must be followed by parentheses or a grouping clause"
            }
            SyntaxRule::GroupingWithoutAggregation => {
                "\"by\"/\"without\" must belong to an aggregation such as sum() or avg()"
            }
            SyntaxRule::RangeInArithmetic => {
                "Cannot perform math directly on range vectors. Wrap them in rate() or another function first"
            }
            SyntaxRule::UnbalancedDelimiters => {
                "Unbalanced parentheses, brackets, braces, or quotes"
            }
            SyntaxRule::MissingIdentifier => "Query must contain a metric name or function",
            SyntaxRule::ProseContamination => {
                "Generated text is too long, likely prose instead of PromQL"
            }
        }
    }
}

impl fmt::Display for SyntaxRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Order in which the pattern rules are evaluated. The first hit is reported.
const PATTERN_RULE_ORDER: [SyntaxRule; 7] = [
    SyntaxRule::RangeBeforeGrouping,
    SyntaxRule::GroupingBeforeRange,
    SyntaxRule::ComplementGroupingBrackets,
    SyntaxRule::AggregationBodyWithoutParens,
    SyntaxRule::BareAggregation,
    SyntaxRule::GroupingWithoutAggregation,
    SyntaxRule::RangeInArithmetic,
];

static FORBIDDEN_PATTERNS: Lazy<HashMap<SyntaxRule, Regex>> = Lazy::new(|| {
    [
        (SyntaxRule::RangeBeforeGrouping, r"\]\s*by\s*\["),
        (SyntaxRule::GroupingBeforeRange, r"\bby\s*\["),
        (SyntaxRule::ComplementGroupingBrackets, r"\bwithout\s*\["),
        (
            SyntaxRule::AggregationBodyWithoutParens,
            r"\b(?:sum|avg|min|max|count)\s+(?:by|without)\s*\([^)]*\)\s*(?:[^\s(]|$)",
        ),
        (SyntaxRule::RangeInArithmetic, r"\[[^\]]+\]\s*[-+*/%^]"),
    ]
    .into_iter()
    .filter_map(|(rule, pattern)| Regex::new(pattern).ok().map(|re| (rule, re)))
    .collect()
});

static AGGREGATION_WITH_SPACE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(?:sum|avg|min|max|count|stddev|stdvar|topk|bottomk|quantile)\s+(\S+)").ok()
});

static GROUPING_KEYWORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b(?:by|without)\b").ok());

static CODE_FENCE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)```(?:promql)?").ok());

static LEADING_LABEL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(?:promql|query|output)\s*:\s*").ok());

static IDENTIFIER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[a-zA-Z_:][a-zA-Z0-9_:]*").ok());

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// A canonical single-line query that passed every syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedQuery {
    query: String,
    metric_candidates: Vec<String>,
}

impl ValidatedQuery {
    pub(crate) fn new(query: String) -> Self {
        let metric_candidates = extract_metric_candidates(&query);
        Self {
            query,
            metric_candidates,
        }
    }

    /// The canonical query text.
    pub fn as_str(&self) -> &str {
        &self.query
    }

    /// Identifiers in the query that look like metric names.
    pub fn metric_candidates(&self) -> &[String] {
        &self.metric_candidates
    }

    pub fn into_string(self) -> String {
        self.query
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

/// Result of screening a candidate's raw output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screened {
    /// The text is a usable query.
    Query(ValidatedQuery),
    /// The candidate explicitly declined to answer.
    NoAnswer,
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Reduce raw generated text to a single candidate line.
///
/// Strips code fences, echoed labels, wrapping or stray edge quotes and one
/// trailing punctuation mark, keeps the first non-empty line and collapses
/// runs of whitespace.
pub fn normalize(raw: &str) -> String {
    let unfenced = match CODE_FENCE.as_ref() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };

    // A label on its own line takes the line break with it.
    let unlabeled = strip_leading_label(unfenced.trim());

    let first_line = unlabeled
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let text = strip_leading_label(first_line);
    let text = strip_wrapping_quotes(text);
    let text = strip_leading_label(text);
    let text = text.strip_suffix(&['.', ';', ','][..]).unwrap_or(text);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_leading_label(text: &str) -> &str {
    match LEADING_LABEL.as_ref().and_then(|re| re.find(text)) {
        Some(m) => text[m.end()..].trim(),
        None => text,
    }
}

fn strip_wrapping_quotes(text: &str) -> &str {
    const QUOTES: [char; 3] = ['"', '\'', '`'];

    for quote in QUOTES {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return text[1..text.len() - 1].trim();
        }
    }

    // A query never starts or ends with a quote, so a lone one is residue.
    let text = text.strip_prefix(&QUOTES[..]).unwrap_or(text);
    text.strip_suffix(&QUOTES[..]).unwrap_or(text).trim()
}

/// Replace the contents of string literals with spaces.
///
/// Label values are free text and must not trip the pattern checks.
pub(crate) fn mask_string_literals(query: &str) -> String {
    mask_literals(query).0
}

/// Masked text plus whether a literal was still open at the end.
fn mask_literals(query: &str) -> (String, bool) {
    let mut out = String::with_capacity(query.len());
    let mut open_quote: Option<char> = None;
    let mut escaped = false;

    for ch in query.chars() {
        match open_quote {
            Some(quote) => {
                if escaped {
                    escaped = false;
                    out.push(' ');
                } else if ch == '\\' {
                    escaped = true;
                    out.push(' ');
                } else if ch == quote {
                    open_quote = None;
                    out.push(ch);
                } else {
                    out.push(' ');
                }
            }
            None => {
                if matches!(ch, '"' | '\'' | '`') {
                    open_quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }

    (out, open_quote.is_some())
}

// ============================================================================
// CHECKS
// ============================================================================

/// Walk the text keeping independent counters for `()`, `[]` and `{}`.
///
/// Fails as soon as any counter goes negative, and requires all three to
/// end at zero.
pub fn delimiters_balanced(query: &str) -> bool {
    let (mut round, mut square, mut curly) = (0i64, 0i64, 0i64);

    for ch in query.chars() {
        match ch {
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            '{' => curly += 1,
            '}' => curly -= 1,
            _ => continue,
        }
        if round < 0 || square < 0 || curly < 0 {
            return false;
        }
    }

    round == 0 && square == 0 && curly == 0
}

fn violates(rule: SyntaxRule, masked: &str) -> bool {
    match rule {
        SyntaxRule::BareAggregation => has_bare_aggregation(masked),
        SyntaxRule::GroupingWithoutAggregation => has_detached_grouping(masked),
        other => FORBIDDEN_PATTERNS
            .get(&other)
            .is_some_and(|re| re.is_match(masked)),
    }
}

fn has_bare_aggregation(masked: &str) -> bool {
    let Some(re) = AGGREGATION_WITH_SPACE.as_ref() else {
        return false;
    };

    re.captures_iter(masked).any(|caps| {
        let rest = caps.get(1).map_or("", |m| m.as_str());
        if rest.starts_with('(') {
            return false;
        }
        let word = rest
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .next()
            .unwrap_or("");
        !matches!(word, "by" | "without")
    })
}

fn has_detached_grouping(masked: &str) -> bool {
    let Some(re) = GROUPING_KEYWORD.as_ref() else {
        return false;
    };
    let bytes = masked.as_bytes();

    re.find_iter(masked).any(|m| {
        if brace_depth_at(bytes, m.start()) > 0 {
            return false;
        }
        !preceded_by_aggregation(masked, m.start())
    })
}

fn brace_depth_at(bytes: &[u8], pos: usize) -> i64 {
    bytes[..pos].iter().fold(0i64, |depth, b| match b {
        b'{' => depth + 1,
        b'}' => depth - 1,
        _ => depth,
    })
}

/// A grouping keyword at `pos` is attached either directly after an
/// aggregation operator (`sum by (x) (...)`) or after the closing paren of
/// an aggregation call (`sum(...) by (x)`).
fn preceded_by_aggregation(masked: &str, pos: usize) -> bool {
    let bytes = masked.as_bytes();
    let mut i = skip_whitespace_back(bytes, pos);
    if i == 0 {
        return false;
    }

    if bytes[i - 1] == b')' {
        match matching_open_paren(bytes, i - 1) {
            Some(open) => i = skip_whitespace_back(bytes, open),
            None => return false,
        }
    }

    let end = i;
    while i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
        i -= 1;
    }

    let word = masked[i..end].to_ascii_lowercase();
    AGGREGATION_OPERATORS.contains(&word.as_str())
}

fn skip_whitespace_back(bytes: &[u8], mut i: usize) -> usize {
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    i
}

fn matching_open_paren(bytes: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0i64;
    for j in (0..=close).rev() {
        match bytes[j] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Screen raw generated text.
///
/// Returns `Screened::NoAnswer` for the decline sentinel, a validated query
/// when every check passes, or the first violated rule.
pub fn screen(raw: &str) -> Result<Screened, SyntaxViolation> {
    let text = normalize(raw);

    if text.eq_ignore_ascii_case(NO_ANSWER_SENTINEL) {
        return Ok(Screened::NoAnswer);
    }

    validate_canonical(text).map(Screened::Query)
}

/// Validate text that is already a single line, such as a user-supplied query.
pub fn validate(query: &str) -> Result<ValidatedQuery, SyntaxViolation> {
    validate_canonical(normalize(query))
}

fn validate_canonical(text: String) -> Result<ValidatedQuery, SyntaxViolation> {
    if text.chars().count() < MIN_QUERY_LEN {
        return Err(SyntaxViolation::new(SyntaxRule::EmptyQuery, text));
    }

    let (masked, unterminated) = mask_literals(&text);
    if unterminated {
        return Err(SyntaxViolation::new(SyntaxRule::UnbalancedDelimiters, text));
    }

    if let Some(rule) = PATTERN_RULE_ORDER
        .iter()
        .copied()
        .find(|rule| violates(*rule, &masked))
    {
        return Err(SyntaxViolation::new(rule, text));
    }

    if !delimiters_balanced(&masked) {
        return Err(SyntaxViolation::new(SyntaxRule::UnbalancedDelimiters, text));
    }

    let has_identifier = IDENTIFIER.as_ref().is_some_and(|re| re.is_match(&text));
    if !has_identifier && !text.contains('(') {
        return Err(SyntaxViolation::new(SyntaxRule::MissingIdentifier, text));
    }

    if text.chars().count() > MAX_QUERY_LEN {
        return Err(SyntaxViolation::new(SyntaxRule::ProseContamination, text));
    }

    Ok(ValidatedQuery::new(text))
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn delimiter_soup() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                Just('('),
                Just(')'),
                Just('['),
                Just(']'),
                Just('{'),
                Just('}'),
                Just('a'),
                Just('_'),
                Just('x'),
            ],
            3..40,
        )
        .prop_map(|chars| chars.into_iter().collect())
    }

    fn goes_negative_or_unclosed(s: &str) -> bool {
        let mut counts = [0i64; 3];
        for ch in s.chars() {
            let (idx, delta) = match ch {
                '(' => (0, 1),
                ')' => (0, -1),
                '[' => (1, 1),
                ']' => (1, -1),
                '{' => (2, 1),
                '}' => (2, -1),
                _ => continue,
            };
            counts[idx] += delta;
            if counts[idx] < 0 {
                return true;
            }
        }
        counts.iter().any(|c| *c != 0)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any text whose delimiter counts dip below zero or do not close is rejected.
        #[test]
        fn prop_unbalanced_text_is_rejected(s in delimiter_soup()) {
            prop_assume!(goes_negative_or_unclosed(&s));
            prop_assert!(validate(&s).is_err());
        }

        /// Accepted output is always a single line without doubled spaces.
        #[test]
        fn prop_accepted_output_is_canonical(s in "[a-z_]{3,12}(\\n[a-z ]{0,20})?") {
            if let Ok(Screened::Query(q)) = screen(&s) {
                prop_assert!(!q.as_str().contains('\n'));
                prop_assert!(!q.as_str().contains("  "));
            }
        }
    }
}
