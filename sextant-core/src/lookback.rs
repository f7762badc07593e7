//! Lookback window detection and range-selector rewriting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::promql::ValidatedQuery;

static RANGE_SELECTOR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\[(?:\d+(?:ms|[smhdwy]))+\]").ok());

/// Minute/hour/day phrasings, tried in order. The first match wins.
///
/// A number must not continue another word or number, so the `5` in
/// `1.5 hours` is never read on its own.
static LOOKBACK_PHRASES: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"(?i)\bfor\s+(\d+(?:\.\d+)?)\s*(?:minutes?|mins?|m)\b", 1.0),
        (r"(?i)\blast\s+(\d+(?:\.\d+)?)\s*(?:minutes?|mins?|m)\b", 1.0),
        (r"(?i)(?:^|[^\w.])(\d+(?:\.\d+)?)\s*(?:minutes?|mins?|m)\b", 1.0),
        (r"(?i)(?:^|[^\w.])(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\b", 60.0),
        (r"(?i)(?:^|[^\w.])(\d+(?:\.\d+)?)\s*(?:days?|d)\b", 1440.0),
    ]
    .into_iter()
    .filter_map(|(pattern, factor)| Regex::new(pattern).ok().map(|re| (re, factor)))
    .collect()
});

/// Look-back inputs for one request, in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    /// Window found in the request text
    pub detected: Option<u32>,
    /// Window the caller asked for
    pub requested: Option<u32>,
}

impl LookbackWindow {
    pub fn new(detected: Option<u32>, requested: Option<u32>) -> Self {
        Self {
            detected,
            requested,
        }
    }

    /// The window to apply, if any.
    pub fn effective(&self) -> Option<u32> {
        reconcile(self.detected, self.requested)
    }
}

/// Pick the effective window: a positive detected value wins, then a
/// positive requested value, otherwise no rewrite.
pub fn reconcile(detected: Option<u32>, requested: Option<u32>) -> Option<u32> {
    detected
        .filter(|m| *m > 0)
        .or_else(|| requested.filter(|m| *m > 0))
}

/// Replace every range-selector literal with `[<minutes>m]`.
///
/// `None` or zero leaves the query untouched.
pub fn rewrite_range_selectors(query: &str, effective: Option<u32>) -> String {
    let (Some(minutes), Some(re)) = (effective.filter(|m| *m > 0), RANGE_SELECTOR.as_ref()) else {
        return query.to_string();
    };
    re.replace_all(query, format!("[{}m]", minutes).as_str())
        .into_owned()
}

/// Find a look-back window phrased in the request text, in minutes.
pub fn detect_lookback(text: &str) -> Option<u32> {
    LOOKBACK_PHRASES.iter().find_map(|(re, factor)| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|n| (n * factor).round())
            .filter(|minutes| *minutes >= 1.0 && *minutes <= f64::from(u32::MAX))
            .map(|minutes| minutes as u32)
    })
}

impl ValidatedQuery {
    /// Apply an effective window to every range selector in this query.
    pub fn with_lookback(&self, effective: Option<u32>) -> ValidatedQuery {
        ValidatedQuery::new(rewrite_range_selectors(self.as_str(), effective))
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn query_with_ranges() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            ("[a-z]{1,6}_[a-z]{1,6}", 1u32..120, prop_oneof![Just("s"), Just("m"), Just("h"), Just("d")]),
            1..4,
        )
        .prop_map(|parts| {
            parts
                .into_iter()
                .map(|(name, n, unit)| format!("rate({}[{}{}])", name, n, unit))
                .collect::<Vec<_>>()
                .join(" + ")
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Rewriting an already rewritten query with the same window changes nothing.
        #[test]
        fn prop_rewrite_is_idempotent(query in query_with_ranges(), minutes in 1u32..10_000) {
            let once = rewrite_range_selectors(&query, Some(minutes));
            let twice = rewrite_range_selectors(&once, Some(minutes));
            prop_assert_eq!(once, twice);
        }

        /// After a rewrite every selector carries the effective window.
        #[test]
        fn prop_rewrite_is_uniform(query in query_with_ranges(), minutes in 1u32..10_000) {
            let rewritten = rewrite_range_selectors(&query, Some(minutes));
            let expected = format!("[{}m]", minutes);
            prop_assert_eq!(rewritten.matches('[').count(), rewritten.matches(expected.as_str()).count());
        }

        /// A positive detected value always wins.
        #[test]
        fn prop_detected_wins(detected in 1u32..10_000, requested in proptest::option::of(0u32..10_000)) {
            prop_assert_eq!(reconcile(Some(detected), requested), Some(detected));
        }
    }
}
