//! Loading the incident corpus from disk.

use std::path::Path;

use crate::error::{KnowledgeError, Result};
use crate::types::IncidentCase;

/// Load a JSON array of incident cases.
pub fn load_corpus(path: &Path) -> Result<Vec<IncidentCase>> {
    if !path.exists() {
        return Err(KnowledgeError::CorpusNotFound(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path).map_err(|source| KnowledgeError::ReadCorpus {
        path: path.to_path_buf(),
        source,
    })?;

    let cases: Vec<IncidentCase> =
        serde_json::from_str(&raw).map_err(|source| KnowledgeError::ParseCorpus {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!(path = %path.display(), cases = cases.len(), "Loaded knowledge corpus");
    Ok(cases)
}
