//! Error types for the knowledge crate.

use std::path::PathBuf;

use faultline_llm::LlmError;
use thiserror::Error;

/// Errors raised by the corpus loader and the individual search tiers.
///
/// The tier chain in [`crate::VectorIndex`] absorbs every one of these;
/// they only reach callers from startup paths such as [`crate::load_corpus`].
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The corpus file does not exist.
    #[error("Knowledge corpus not found: {0}")]
    CorpusNotFound(PathBuf),

    /// The corpus file exists but could not be read.
    #[error("Failed to read corpus {path}: {source}")]
    ReadCorpus {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The corpus file is not a JSON array of incident cases.
    #[error("Failed to parse corpus {path}: {source}")]
    ParseCorpus {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Local vector database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Embedding the query or the corpus failed.
    #[error("Embedding error: {0}")]
    Embedding(#[from] LlmError),

    /// Transport failure talking to the remote vector store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote vector store answered with an error code.
    #[error("Vector store error ({code}): {message}")]
    VectorStore { code: i64, message: String },

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for knowledge operations.
pub type Result<T> = std::result::Result<T, KnowledgeError>;
