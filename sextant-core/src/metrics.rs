//! Metric identifier extraction and catalog cross-reference.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Function names from the PromQL standard library.
pub const KNOWN_FUNCTIONS: &[&str] = &[
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
    "rate",
    "irate",
    "increase",
    "delta",
    "idelta",
    "deriv",
    "resets",
    "changes",
    "predict_linear",
    "holt_winters",
    "avg_over_time",
    "min_over_time",
    "max_over_time",
    "sum_over_time",
    "count_over_time",
    "quantile_over_time",
    "stddev_over_time",
    "stdvar_over_time",
    "last_over_time",
    "present_over_time",
    "absent_over_time",
    "histogram_quantile",
    "abs",
    "absent",
    "ceil",
    "floor",
    "round",
    "exp",
    "sqrt",
    "clamp",
    "clamp_max",
    "clamp_min",
    "ln",
    "log2",
    "log10",
    "label_replace",
    "label_join",
    "sort",
    "sort_desc",
    "scalar",
    "vector",
    "time",
    "timestamp",
    "day_of_month",
    "day_of_week",
    "days_in_month",
    "hour",
    "minute",
    "month",
    "year",
];

/// Binary, set and matching modifiers.
pub const RESERVED_MODIFIERS: &[&str] = &[
    "by",
    "without",
    "on",
    "ignoring",
    "group_left",
    "group_right",
    "bool",
    "and",
    "or",
    "unless",
    "offset",
];

static IDENTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[a-zA-Z_:][a-zA-Z0-9_:]*").ok());

static STRING_LITERAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`[^`]*`"#).ok());

static LABEL_MATCHERS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{[^}]*\}").ok());

static LABEL_LISTS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(?:by|without|on|ignoring|group_left|group_right)\s*\([^)]*\)").ok()
});

static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    KNOWN_FUNCTIONS
        .iter()
        .chain(RESERVED_MODIFIERS.iter())
        .copied()
        .collect()
});

fn blank_out(re: Option<&Regex>, text: String) -> String {
    match re {
        Some(re) => re.replace_all(&text, " ").into_owned(),
        None => text,
    }
}

/// Extract the identifiers in `query` that look like metric names.
///
/// Label values, label matchers and grouping label lists are skipped, as are
/// function names and modifiers. Of what remains, only tokens that are not
/// purely alphabetic count: real metric names carry an underscore, a colon
/// or a digit, while plain words are usually noise. Order of first
/// appearance is kept and duplicates are dropped.
pub fn extract_metric_candidates(query: &str) -> Vec<String> {
    let Some(identifier) = IDENTIFIER.as_ref() else {
        return Vec::new();
    };

    let scrubbed = blank_out(STRING_LITERAL.as_ref(), query.to_string());
    let scrubbed = blank_out(LABEL_MATCHERS.as_ref(), scrubbed);
    let scrubbed = blank_out(LABEL_LISTS.as_ref(), scrubbed);
    let bytes = scrubbed.as_bytes();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for m in identifier.find_iter(&scrubbed) {
        // Unit suffix of a number or duration, e.g. the `m` in `5m`.
        if m.start() > 0 && matches!(bytes[m.start() - 1], b'0'..=b'9' | b'.') {
            continue;
        }

        let token = m.as_str();
        if RESERVED.contains(token.to_ascii_lowercase().as_str()) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        if seen.insert(token) {
            candidates.push(token.to_string());
        }
    }

    candidates
}

// ============================================================================
// CATALOG
// ============================================================================

/// Snapshot of the metric names the backend reported.
///
/// An empty catalog means "unknown", never "nothing is valid".
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    names: Arc<HashSet<String>>,
    fetched_at: Option<DateTime<Utc>>,
    ttl: Duration,
}

impl MetricCatalog {
    /// A catalog with no data. Everything validates against it.
    pub fn empty(ttl: Duration) -> Self {
        Self {
            names: Arc::new(HashSet::new()),
            fetched_at: None,
            ttl,
        }
    }

    pub fn new(
        names: impl IntoIterator<Item = String>,
        fetched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            names: Arc::new(names.into_iter().collect()),
            fetched_at: Some(fetched_at),
            ttl,
        }
    }

    /// True while the snapshot is younger than its TTL.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Some(fetched_at) = self.fetched_at else {
            return false;
        };
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return false;
        };
        now.signed_duration_since(fetched_at) < ttl
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Known/unknown split of a query's metric candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPartition {
    pub known: Vec<String>,
    pub unknown: Vec<String>,
}

impl MetricPartition {
    pub fn all_known(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Split already-extracted candidates against `catalog`.
///
/// An empty catalog reports every candidate as known.
pub fn partition_candidates(candidates: &[String], catalog: &MetricCatalog) -> MetricPartition {
    if catalog.is_empty() {
        return MetricPartition {
            known: candidates.to_vec(),
            unknown: Vec::new(),
        };
    }

    let (known, unknown): (Vec<String>, Vec<String>) = candidates
        .iter()
        .cloned()
        .partition(|name| catalog.contains(name));

    MetricPartition { known, unknown }
}

/// Extract candidates from `query` and split them against `catalog`.
pub fn partition(query: &str, catalog: &MetricCatalog) -> MetricPartition {
    partition_candidates(&extract_metric_candidates(query), catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> MetricCatalog {
        MetricCatalog::new(
            names.iter().map(|s| s.to_string()),
            Utc::now(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_extract_skips_functions_and_words() {
        let got = extract_metric_candidates(
            "100 - (avg(rate(node_cpu_seconds_total{mode=\"idle\"}[15m])) * 100)",
        );
        assert_eq!(got, vec!["node_cpu_seconds_total"]);
    }

    #[test]
    fn test_extract_dedupes_in_order() {
        let got = extract_metric_candidates(
            "rate(redis_keyspace_hits_total[5m]) / (rate(redis_keyspace_hits_total[5m]) + rate(redis_keyspace_misses_total[5m]))",
        );
        assert_eq!(
            got,
            vec!["redis_keyspace_hits_total", "redis_keyspace_misses_total"]
        );
    }

    #[test]
    fn test_extract_skips_grouping_labels_and_durations() {
        let got = extract_metric_candidates(
            "sum by (instance_name) (rate(node_network_receive_bytes_total[1h30m]))",
        );
        assert_eq!(got, vec!["node_network_receive_bytes_total"]);
    }

    #[test]
    fn test_extract_keeps_recording_rules_and_digits() {
        let got = extract_metric_candidates("job:http_requests:rate5m + node_load1 - log2(x_y)");
        assert_eq!(got, vec!["job:http_requests:rate5m", "node_load1", "x_y"]);
    }

    #[test]
    fn test_extract_purely_alphabetic_is_dropped() {
        assert!(extract_metric_candidates("up").is_empty());
        assert!(extract_metric_candidates("CPU usage").is_empty());
    }

    #[test]
    fn test_partition_against_catalog() {
        let cat = catalog(&["node_cpu_seconds_total"]);
        let p = partition(
            "rate(node_cpu_seconds_total[5m]) + rate(made_up_metric_total[5m])",
            &cat,
        );
        assert_eq!(p.known, vec!["node_cpu_seconds_total"]);
        assert_eq!(p.unknown, vec!["made_up_metric_total"]);
        assert!(!p.all_known());
    }

    #[test]
    fn test_partition_empty_catalog_is_fail_open() {
        let cat = MetricCatalog::empty(Duration::from_secs(60));
        let p = partition("rate(made_up_metric_total[5m])", &cat);
        assert_eq!(p.known, vec!["made_up_metric_total"]);
        assert!(p.unknown.is_empty());
    }

    #[test]
    fn test_catalog_freshness() {
        let now = Utc::now();
        let cat = MetricCatalog::new(vec!["a_b".to_string()], now, Duration::from_secs(60));
        assert!(cat.is_fresh(now + chrono::Duration::seconds(59)));
        assert!(!cat.is_fresh(now + chrono::Duration::seconds(60)));
        assert!(!MetricCatalog::empty(Duration::from_secs(60)).is_fresh(now));
    }

    #[test]
    fn test_reserved_sets_are_disjoint() {
        for modifier in RESERVED_MODIFIERS {
            assert!(!KNOWN_FUNCTIONS.contains(modifier), "{}", modifier);
        }
    }
}
