//! Generation candidates and their fixed priority order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Model identifiers tried when nothing else is configured, best first.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-preview-05-20",
    "gemini-2.5-pro",
    "gemini-flash-latest",
    "gemini-pro-latest",
];

/// One generation backend model with its priority rank (0 is tried first).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationCandidate {
    pub id: String,
    pub rank: usize,
}

/// Immutable, ordered candidate list.
///
/// Set once at startup and shared by every request. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    candidates: Arc<[GenerationCandidate]>,
}

impl CandidateList {
    /// Build a list from identifiers in priority order.
    ///
    /// Blank identifiers are skipped and repeats keep their first position.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: Vec<String> = Vec::new();
        for id in ids {
            let id = id.as_ref().trim();
            if !id.is_empty() && !seen.iter().any(|s| s == id) {
                seen.push(id.to_string());
            }
        }

        let candidates = seen
            .into_iter()
            .enumerate()
            .map(|(rank, id)| GenerationCandidate { id, rank })
            .collect::<Vec<_>>();

        Self {
            candidates: candidates.into(),
        }
    }

    /// Parse a comma separated override. Returns `None` when nothing usable
    /// is listed.
    pub fn parse(csv: &str) -> Option<Self> {
        let list = Self::new(csv.split(','));
        (!list.is_empty()).then_some(list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationCandidate> {
        self.candidates.iter()
    }

    pub fn get(&self, index: usize) -> Option<&GenerationCandidate> {
        self.candidates.get(index)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Identifiers in priority order.
    pub fn ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.id.clone()).collect()
    }
}

impl Default for CandidateList {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let list = CandidateList::default();
        assert_eq!(list.len(), 5);
        assert_eq!(list.ids(), DEFAULT_CANDIDATES);
        let first = list.get(0).expect("first candidate");
        assert_eq!(first.id, "gemini-2.5-flash");
        assert_eq!(first.rank, 0);
        assert_eq!(list.get(4).map(|c| c.rank), Some(4));
    }

    #[test]
    fn test_parse_trims_and_dedupes() {
        let list = CandidateList::parse(" a , b,, a ,c ").expect("non-empty list");
        assert_eq!(list.ids(), vec!["a", "b", "c"]);
        assert_eq!(list.get(2).map(|c| c.rank), Some(2));
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(CandidateList::parse("").is_none());
        assert!(CandidateList::parse(" , ,").is_none());
    }
}
