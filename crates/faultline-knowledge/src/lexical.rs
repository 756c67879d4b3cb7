//! Keyword-overlap search, the tier that cannot fail.

use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{IncidentCase, RetrievedCase};

/// Token-overlap matcher over the in-memory corpus.
///
/// Similarity is `|query ∩ case| / max(#query tokens, 1)` after lowercasing
/// and splitting on whitespace. Cases with no overlap are dropped.
#[derive(Debug, Clone)]
pub struct LexicalSearch {
    corpus: Arc<Vec<IncidentCase>>,
}

impl LexicalSearch {
    pub fn new(corpus: Arc<Vec<IncidentCase>>) -> Self {
        Self { corpus }
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievedCase> {
        let query = query.to_lowercase();
        let query_tokens: Vec<&str> = query.split_whitespace().collect();
        let query_set: HashSet<&str> = query_tokens.iter().copied().collect();
        let denominator = query_tokens.len().max(1) as f64;

        let mut results: Vec<RetrievedCase> = self
            .corpus
            .iter()
            .filter_map(|case| {
                let text = case.lexical_text().to_lowercase();
                let common = text
                    .split_whitespace()
                    .collect::<HashSet<_>>()
                    .intersection(&query_set)
                    .count();
                (common > 0).then(|| RetrievedCase::new(case.clone(), common as f64 / denominator))
            })
            .collect();

        crate::index::sort_by_similarity(&mut results);
        results.truncate(k);
        results
    }
}
