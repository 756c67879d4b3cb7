//! Fail-open reranking of retrieved cases.

use std::collections::HashSet;
use tracing::{debug, warn};

use faultline_llm::SharedReranker;

use crate::types::RetrievedCase;

/// Reorders candidates with an external relevance model.
///
/// Any failure, or a disabled service, yields the original candidates
/// truncated to `top_n`.
#[derive(Clone)]
pub struct Reranker {
    service: Option<SharedReranker>,
    top_n: usize,
}

impl Reranker {
    pub fn new(service: SharedReranker, top_n: usize) -> Self {
        Self {
            service: Some(service),
            top_n,
        }
    }

    pub fn disabled(top_n: usize) -> Self {
        Self {
            service: None,
            top_n,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub async fn rerank(&self, query: &str, mut candidates: Vec<RetrievedCase>) -> Vec<RetrievedCase> {
        let Some(ref service) = self.service else {
            candidates.truncate(self.top_n);
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        let texts: Vec<String> = candidates.iter().map(RetrievedCase::rerank_text).collect();
        let scores = match service.score(query, &texts, self.top_n).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(service = service.name(), error = %e, "Rerank failed, keeping retrieval order");
                candidates.truncate(self.top_n);
                return candidates;
            }
        };

        let mut seen = HashSet::new();
        let mut reranked: Vec<RetrievedCase> = scores
            .iter()
            .filter(|s| s.index < candidates.len() && seen.insert(s.index))
            .take(self.top_n)
            .map(|s| {
                let mut case = candidates[s.index].clone();
                case.rerank_score = Some(s.relevance_score);
                case
            })
            .collect();

        if reranked.is_empty() {
            warn!(service = service.name(), "Rerank returned no usable scores, keeping retrieval order");
            candidates.truncate(self.top_n);
            return candidates;
        }

        reranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
        debug!(candidates = candidates.len(), kept = reranked.len(), "Reranked cases");
        reranked
    }
}
