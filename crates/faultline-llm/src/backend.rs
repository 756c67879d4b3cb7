//! Language model backend trait.
//!
//! Diagnosis only ever needs whole responses, so the trait is a single
//! request/response call plus a health probe.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits).
/// Non-retryable errors are returned immediately. A provider-supplied
/// `retry-after` replaces the computed backoff for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for language model providers.
///
/// Plain prompting uses `complete` with no tools; the tool-calling agent
/// attaches tool definitions and reads `tool_use` blocks back.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// The model used when the caller has no preference.
    fn default_model(&self) -> &str;

    /// Check if the backend is reachable and properly configured.
    async fn health_check(&self) -> Result<()>;

    /// Returns true if the backend handles tools natively via its API.
    fn supports_native_tools(&self) -> bool {
        false
    }
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A mock backend for testing purposes.
///
/// Returns pre-configured responses in order, useful for deterministic testing
/// of the diagnosis pipeline and the agent loop.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct MockBackend {
    responses: parking_lot::Mutex<Vec<Result<CompletionResponse>>>,
    request_log: parking_lot::Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
    native_tools: bool,
}

#[cfg(any(test, feature = "testing"))]
impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock backend that may also return errors.
    pub fn with_results(responses: Vec<Result<CompletionResponse>>) -> Self {
        Self {
            responses: parking_lot::Mutex::new(responses),
            request_log: parking_lot::Mutex::new(Vec::new()),
            delay: None,
            native_tools: true,
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![Self::text_response(text)])
    }

    /// Create a mock backend whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_results(vec![Err(LlmError::Network(message.into()))])
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report no native tool support, like a completion-only endpoint.
    pub fn without_native_tools(mut self) -> Self {
        self.native_tools = false;
        self
    }

    /// Build a plain text response.
    pub fn text_response(text: impl Into<String>) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![crate::types::ContentBlock::text(text)],
            crate::types::StopReason::EndTurn,
            crate::types::Usage::new(10, 20),
        )
    }

    /// Build a response requesting a single tool call.
    pub fn tool_use_response(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> CompletionResponse {
        CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![crate::types::ContentBlock::tool_use(id, name, input)],
            crate::types::StopReason::ToolUse,
            crate::types::Usage::new(10, 20),
        )
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        responses.remove(0)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn supports_native_tools(&self) -> bool {
        self.native_tools
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let response = backend.complete(request).await.unwrap();

        assert_eq!(response.text(), "Hello!");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockBackend::new(vec![]);

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        assert!(backend.complete(request).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_scripted_error() {
        let backend = MockBackend::failing("connection reset");

        let request = CompletionRequest::new("test-model", vec![Message::user("Hi")], 100);
        let err = backend.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }

    #[tokio::test]
    async fn test_mock_backend_with_tool_use() {
        let backend = MockBackend::new(vec![MockBackend::tool_use_response(
            "call_1",
            "execute_ssh_command",
            serde_json::json!({"command": "systemctl status mysql"}),
        )]);

        let request = CompletionRequest::new("test-model", vec![Message::user("check")], 100);
        let response = backend.complete(request).await.unwrap();

        assert!(response.has_tool_use());
        assert_eq!(response.tool_uses()[0].name, "execute_ssh_command");
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_network_error() {
        let calls = AtomicU32::new(0);
        let result = with_retry(2, Duration::from_millis(1), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LlmError::Network("reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Network("down".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(5, Duration::from_millis(1), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Auth("bad key".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
