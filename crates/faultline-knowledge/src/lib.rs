//! Incident knowledge and similarity search for Faultline.
//!
//! The corpus is a fixed list of [`IncidentCase`]s loaded at startup. Search
//! goes through a [`VectorIndex`], an ordered chain of tiers where the first
//! tier to answer wins:
//!
//! 1. **milvus**: remote vector database ([`MilvusStore`])
//! 2. **local**: in-memory sqlite-vec index built from the same corpus ([`LocalVectorStore`])
//! 3. **lexical**: token overlap ([`LexicalSearch`]), which cannot fail
//!
//! [`Reranker`] optionally refines the result and never fails either.

pub mod corpus;
pub mod error;
pub mod index;
pub mod knowledge_base;
pub mod lexical;
pub mod local;
pub mod milvus;
pub mod rerank;
pub mod store;
pub mod types;

pub use corpus::load_corpus;
pub use error::{KnowledgeError, Result};
pub use index::{SearchTier, VectorIndex, VectorTier};
pub use knowledge_base::{IndexPlan, KnowledgeBase};
pub use lexical::LexicalSearch;
pub use local::LocalVectorStore;
pub use milvus::{MilvusConfig, MilvusStore};
pub use rerank::Reranker;
pub use store::{SharedVectorStore, StoredDocument, VectorHit, VectorStore};
pub use types::{IncidentCase, RetrievedCase, distance_to_similarity};
