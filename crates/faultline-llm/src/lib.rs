//! Clients for the external model services Faultline depends on.
//!
//! Three stateless request/response collaborators live here, each behind a
//! trait so the retrieval and reasoning code never sees HTTP:
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │ LlmBackend       │  │ Embedder         │  │ RerankService    │
//! │ complete()       │  │ embed()          │  │ score()          │
//! └──────────────────┘  └──────────────────┘  └──────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//!    OpenAiBackend         OpenAiEmbedder         HttpReranker
//!    (chat/completions)    (/embeddings)          (/rerank)
//! ```
//!
//! Every failure is an [`LlmError`]; callers decide how to degrade.

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod rerank;
pub mod types;

pub use backend::{LlmBackend, SharedBackend, with_retry};
pub use embeddings::{
    Embedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder, euclidean_distance,
};
pub use error::{LlmError, RateLimitInfo, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use rerank::{HttpReranker, HttpRerankerConfig, RerankScore, RerankService, SharedReranker};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};

#[cfg(any(test, feature = "testing"))]
pub use backend::MockBackend;
#[cfg(any(test, feature = "testing"))]
pub use embeddings::MockEmbedder;
#[cfg(any(test, feature = "testing"))]
pub use rerank::MockReranker;
