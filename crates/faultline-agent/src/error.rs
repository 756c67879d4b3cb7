//! Error types for the agent crate.
//!
//! None of these reach an HTTP caller directly: the pipeline and the agent
//! turn them into degraded results. Only the streaming path reports them,
//! as a terminal `error` event.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] faultline_llm::LlmError),

    /// The remote shell could not run the command.
    #[error("Remote execution error: {0}")]
    Remote(String),

    /// Invalid tool parameters.
    #[error("Invalid tool parameters: {0}")]
    InvalidToolParams(String),

    /// The backend cannot attach tool definitions to a request.
    #[error("Backend '{0}' does not support tool calling")]
    ToolsUnsupported(String),

    /// The run was cancelled, usually because the stream consumer went away.
    #[error("Task cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }
}
