//! Tiered similarity search.
//!
//! ```text
//! search(query, k)
//!   │
//!   ├─ tier: milvus  ── embed → ANN → 1/(1+d) ──┐ ok → done
//!   │        (error, fall through)              │
//!   ├─ tier: local   ── embed → sqlite-vec ─────┤ ok → done
//!   │        (error, fall through)              │
//!   └─ lexical       ── token overlap ──────────┘ always ok
//! ```
//!
//! The first tier that answers decides the result, even an empty one.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use faultline_llm::SharedEmbedder;

use crate::error::Result;
use crate::lexical::LexicalSearch;
use crate::store::SharedVectorStore;
use crate::types::{RetrievedCase, distance_to_similarity};

/// One provider in the fallback chain.
#[async_trait]
pub trait SearchTier: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedCase>>;
}

/// Embedding + vector store, shared by the remote and local tiers.
pub struct VectorTier {
    embedder: SharedEmbedder,
    store: SharedVectorStore,
}

impl VectorTier {
    pub fn new(embedder: SharedEmbedder, store: SharedVectorStore) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl SearchTier for VectorTier {
    fn name(&self) -> &str {
        self.store.name()
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedCase>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, k).await?;

        let mut ranked: Vec<(usize, RetrievedCase)> = hits
            .into_iter()
            .map(|hit| {
                let position = hit.document.position();
                let case =
                    RetrievedCase::new(hit.document.case, distance_to_similarity(hit.distance))
                        .with_content(hit.document.content);
                (position, case)
            })
            .collect();
        // Ties keep corpus order, whatever order the store returned them in.
        ranked.sort_by(|(pa, a), (pb, b)| {
            b.similarity.total_cmp(&a.similarity).then(pa.cmp(pb))
        });

        Ok(ranked.into_iter().take(k).map(|(_, case)| case).collect())
    }
}

/// Stable, descending by similarity.
pub(crate) fn sort_by_similarity(results: &mut [RetrievedCase]) {
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
}

/// Ordered fallback chain ending in the lexical tier.
pub struct VectorIndex {
    tiers: Vec<Arc<dyn SearchTier>>,
    lexical: LexicalSearch,
}

impl VectorIndex {
    pub fn new(tiers: Vec<Arc<dyn SearchTier>>, lexical: LexicalSearch) -> Self {
        Self { tiers, lexical }
    }

    /// An index with only the lexical tier.
    pub fn lexical_only(lexical: LexicalSearch) -> Self {
        Self::new(Vec::new(), lexical)
    }

    /// Names of the tiers in priority order, lexical last.
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers
            .iter()
            .map(|t| t.name().to_string())
            .chain(std::iter::once("lexical".to_string()))
            .collect()
    }

    /// At most `k` cases, most similar first. Never fails.
    pub async fn search(&self, query: &str, k: usize) -> Vec<RetrievedCase> {
        for tier in &self.tiers {
            match tier.search(query, k).await {
                Ok(results) => {
                    debug!(tier = tier.name(), hits = results.len(), "Search tier answered");
                    return results;
                }
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Search tier failed, falling through");
                }
            }
        }

        let results = self.lexical.search(query, k);
        debug!(tier = "lexical", hits = results.len(), "Search tier answered");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KnowledgeError;
    use crate::local::LocalVectorStore;
    use crate::store::{StoredDocument, VectorHit, VectorStore};
    use crate::types::IncidentCase;
    use faultline_llm::{Embedder, MockEmbedder};

    struct FailingTier;

    #[async_trait]
    impl SearchTier for FailingTier {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedCase>> {
            Err(KnowledgeError::InvalidData("down".to_string()))
        }
    }

    struct EmptyTier;

    #[async_trait]
    impl SearchTier for EmptyTier {
        fn name(&self) -> &str {
            "empty"
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedCase>> {
            Ok(Vec::new())
        }
    }

    fn corpus() -> Arc<Vec<IncidentCase>> {
        Arc::new(vec![
            IncidentCase::new(
                "MySQL connection refused",
                "connection refused on port 3306",
                "mysqld not running",
                "restart mysql service",
            ),
            IncidentCase::new("Nginx 502", "upstream prematurely closed", "php-fpm crash", "restart php-fpm"),
            IncidentCase::new("Disk full", "No space left on device", "log growth", "rotate logs"),
        ])
    }

    #[tokio::test]
    async fn test_failing_tiers_fall_through_to_lexical() {
        let index = VectorIndex::new(
            vec![Arc::new(FailingTier), Arc::new(FailingTier)],
            LexicalSearch::new(corpus()),
        );
        let results = index.search("mysql connection refused", 3).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].case.error_type, "MySQL connection refused");
    }

    #[tokio::test]
    async fn test_empty_success_is_final() {
        let index = VectorIndex::new(vec![Arc::new(EmptyTier)], LexicalSearch::new(corpus()));
        assert!(index.search("mysql connection refused", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_embedder_falls_through() {
        let store = Arc::new(LocalVectorStore::open_in_memory(8).unwrap());
        let tier = VectorTier::new(Arc::new(MockEmbedder::failing(8)), store);
        let index = VectorIndex::new(vec![Arc::new(tier)], LexicalSearch::new(corpus()));

        let results = index.search("disk full", 3).await;
        assert_eq!(results[0].case.error_type, "Disk full");
        assert!(results[0].content.is_none());
    }

    #[tokio::test]
    async fn test_local_tier_ranks_exact_document_first() {
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(LocalVectorStore::open_in_memory(16).unwrap());
        let corpus = corpus();

        let documents: Vec<StoredDocument> = corpus
            .iter()
            .enumerate()
            .map(|(i, c)| StoredDocument::from_case(i, c))
            .collect();
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        store.upsert(&documents, &embeddings).await.unwrap();

        let index = VectorIndex::new(
            vec![Arc::new(VectorTier::new(embedder, store))],
            LexicalSearch::new(corpus.clone()),
        );

        let query = corpus[1].document_text();
        let results = index.search(&query, 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].case.error_type, "Nginx 502");
        assert_eq!(results[0].similarity, 1.0);
        assert!(results[0].similarity >= results[1].similarity);
        assert_eq!(results[0].content.as_deref(), Some(query.as_str()));
    }

    #[tokio::test]
    async fn test_results_bounded_and_sorted() {
        let index = VectorIndex::lexical_only(LexicalSearch::new(corpus()));
        for k in 0..5 {
            let results = index.search("connection refused restart disk", k).await;
            assert!(results.len() <= k);
            assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        }
    }

    /// Returns fixed hits regardless of the query vector.
    struct FixedStore(Vec<VectorHit>);

    #[async_trait]
    impl VectorStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn upsert(&self, _documents: &[StoredDocument], _embeddings: &[Vec<f32>]) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<VectorHit>> {
            Ok(self.0.clone())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.0.len())
        }
    }

    #[tokio::test]
    async fn test_vector_ties_keep_corpus_order() {
        let hit = |position: usize, error_type: &str, distance: f32| VectorHit {
            document: StoredDocument::from_case(
                position,
                &IncidentCase::new(error_type, "log", "cause", "fix"),
            ),
            distance,
        };
        let store = FixedStore(vec![
            hit(2, "third", 0.1),
            hit(1, "second", 0.1),
            hit(3, "closest", 0.0),
            hit(0, "first", 0.1),
        ]);
        let tier = VectorTier::new(Arc::new(MockEmbedder::new(4)), Arc::new(store));

        let results = tier.search("q", 3).await.unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.case.error_type.as_str()).collect();
        assert_eq!(order, vec!["closest", "first", "second"]);
    }

    #[test]
    fn test_tier_names() {
        let index = VectorIndex::new(vec![Arc::new(FailingTier)], LexicalSearch::new(corpus()));
        assert_eq!(index.tier_names(), vec!["broken", "lexical"]);
    }
}
