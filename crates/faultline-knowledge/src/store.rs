//! Vector store seam shared by the remote and local tiers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::IncidentCase;

/// A corpus entry as held by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Stable key; the case's position in the corpus.
    pub id: String,
    /// The text that was embedded.
    pub content: String,
    pub case: IncidentCase,
}

impl StoredDocument {
    /// Build the document for the case at `position` in the corpus.
    pub fn from_case(position: usize, case: &IncidentCase) -> Self {
        Self {
            id: format!("case-{position}"),
            content: case.document_text(),
            case: case.clone(),
        }
    }

    /// Corpus position encoded in `id`. Foreign ids sort after every corpus entry.
    pub fn position(&self) -> usize {
        self.id
            .strip_prefix("case-")
            .and_then(|n| n.parse().ok())
            .unwrap_or(usize::MAX)
    }
}

/// A nearest-neighbour match with its L2 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub document: StoredDocument,
    pub distance: f32,
}

/// Nearest-neighbour storage for embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace documents; `embeddings[i]` belongs to `documents[i]`.
    async fn upsert(&self, documents: &[StoredDocument], embeddings: &[Vec<f32>]) -> Result<()>;

    /// The `k` nearest documents, closest first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    async fn count(&self) -> Result<usize>;
}

pub type SharedVectorStore = Arc<dyn VectorStore>;

pub(crate) fn check_lengths(documents: &[StoredDocument], embeddings: &[Vec<f32>]) -> Result<()> {
    if documents.len() != embeddings.len() {
        return Err(crate::KnowledgeError::InvalidData(format!(
            "{} documents but {} embeddings",
            documents.len(),
            embeddings.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_id() {
        let case = IncidentCase::new("a", "b", "c", "d");
        assert_eq!(StoredDocument::from_case(7, &case).position(), 7);

        let foreign = StoredDocument {
            id: "imported".to_string(),
            content: String::new(),
            case,
        };
        assert_eq!(foreign.position(), usize::MAX);
    }
}
