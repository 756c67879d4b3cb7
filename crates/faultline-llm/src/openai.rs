//! OpenAI-compatible chat completion backend.
//!
//! Works against any service exposing `POST {base}/chat/completions`
//! (SiliconFlow, vLLM, one-api proxies, OpenAI itself).

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use std::time::Duration;

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, Result, status_error};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, Usage,
};

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication (optional for local services).
    pub api_key: Option<String>,

    /// Base URL for the API, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Model used when a request does not name one.
    pub model: String,

    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,

    /// Name for this backend instance (used in logs).
    pub name: String,
}

impl OpenAiConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            name: "openai-compatible".to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        match self.config.api_key {
            Some(ref api_key) => builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key)),
            None => builder,
        }
    }

    /// Convert a CompletionRequest to the OpenAI wire format.
    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAiChatRequest {
        let mut messages: Vec<OpenAiMessage> = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage::text("system", system.clone()));
        }

        for m in &request.messages {
            let blocks = m.content.blocks();

            let mut text_content = String::new();
            let mut tool_calls = Vec::new();
            let mut tool_results = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_content.push_str(&text),
                    ContentBlock::ToolUse { id, name, input } => tool_calls.push(OpenAiToolCall {
                        id,
                        call_type: "function".to_string(),
                        function: OpenAiFunctionCall {
                            name,
                            arguments: input.to_string(),
                        },
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => tool_results.push((tool_use_id, content)),
                }
            }

            if !tool_results.is_empty() {
                // Each tool result is its own "tool" role message
                for (tool_id, result_text) in tool_results {
                    messages.push(OpenAiMessage {
                        role: "tool".to_string(),
                        content: Some(result_text),
                        tool_calls: None,
                        tool_call_id: Some(tool_id),
                    });
                }
            } else if !tool_calls.is_empty() {
                messages.push(OpenAiMessage {
                    role: "assistant".to_string(),
                    content: (!text_content.is_empty()).then_some(text_content),
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                });
            } else {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                messages.push(OpenAiMessage::text(role, text_content));
            }
        }

        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function".to_string(),
                    function: OpenAiFunction {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect()
        });

        let model = if request.model.is_empty() {
            self.config.model.clone()
        } else {
            request.model.clone()
        };

        OpenAiChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream: false,
            tools,
        }
    }

    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.text().await?;
        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }

    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        status_error(status, message, retry_after.as_deref())
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let openai_request = self.to_openai_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            tools = openai_request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending chat completion request"
        );

        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .add_headers(self.client.post(self.completions_url()))
                    .json(&openai_request)
                    .send()
                    .await?;

                Self::handle_response(response).await
            },
        )
        .await?;

        tracing::debug!(
            backend = %self.config.name,
            input_tokens = response.usage.input_tokens,
            total_tokens = response.usage.total(),
            "Chat completion received"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<()> {
        let request = CompletionRequest::new(
            self.config.model.clone(),
            vec![Message::user("ping")],
            1,
        );

        match self.complete(request).await {
            Ok(_) => Ok(()),
            // Rate limited means reachable and authenticated
            Err(LlmError::RateLimit(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    id: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    model: String,
    usage: Option<OpenAiUsage>,
}

impl TryFrom<OpenAiChatResponse> for CompletionResponse {
    type Error = LlmError;

    fn try_from(resp: OpenAiChatResponse) -> Result<Self> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let mut blocks = Vec::new();

        if let Some(text) = choice.message.content
            && !text.is_empty()
        {
            blocks.push(ContentBlock::Text { text });
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            // Unparsable arguments reach the tool as a bare string so the
            // caller can report the schema error back to the model
            let input = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments));
            blocks.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };

        let usage = resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse::new(
            resp.id,
            resp.model,
            blocks,
            stop_reason,
            usage,
        ))
    }
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiError {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolDefinition, ToolResultBlock};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OpenAiBackend {
        let config = OpenAiConfig::new(format!("{}/v1", server.uri()), "Qwen-32B")
            .with_api_key("sk-test")
            .with_retry_backoff(Duration::from_millis(1));
        OpenAiBackend::new(config).unwrap()
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let backend =
            OpenAiBackend::new(OpenAiConfig::new("http://llm.local/v1/", "m")).unwrap();
        assert_eq!(
            backend.completions_url(),
            "http://llm.local/v1/chat/completions"
        );
    }

    #[test]
    fn test_to_openai_request_maps_tool_turns() {
        let backend = OpenAiBackend::new(OpenAiConfig::new("http://x", "default-model")).unwrap();

        let request = CompletionRequest::new(
            "",
            vec![
                Message::user("mysql down"),
                Message::assistant_blocks(vec![ContentBlock::tool_use(
                    "call_1",
                    "execute_ssh_command",
                    json!({"command": "systemctl status mysql"}),
                )]),
                Message::tool_results(vec![ToolResultBlock::success("call_1", "inactive")]),
            ],
            100,
        )
        .with_system("sre")
        .with_tools(vec![ToolDefinition::new(
            "execute_ssh_command",
            "run",
            json!({"type": "object"}),
        )]);

        let wire = backend.to_openai_request(&request);
        assert_eq!(wire.model, "default-model");
        let roles: Vec<_> = wire.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(wire.messages[3].tool_call_id.as_deref(), Some("call_1"));

        let calls = wire.messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "execute_ssh_command");
        assert!(calls[0].function.arguments.contains("systemctl status mysql"));
        assert_eq!(wire.tools.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_response_conversion_with_tool_calls() {
        let resp: OpenAiChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "Qwen-32B",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "execute_ssh_command", "arguments": "{\"command\":\"df -h\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }))
        .unwrap();

        let response = CompletionResponse::try_from(resp).unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.tool_uses()[0].input["command"], "df -h");
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[test]
    fn test_response_without_choices_is_invalid() {
        let resp: OpenAiChatResponse =
            serde_json::from_value(json!({"id": "x", "model": "m", "choices": []})).unwrap();
        let err = CompletionResponse::try_from(resp).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_against_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-2",
                "model": "Qwen-32B",
                "choices": [{"message": {"content": "{\"diagnosis\": \"ok\"}"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = CompletionRequest::new("Qwen-32B", vec![Message::user("hi")], 50);
        let response = backend.complete(request).await.unwrap();
        assert_eq!(response.text(), "{\"diagnosis\": \"ok\"}");
    }

    #[tokio::test]
    async fn test_complete_maps_auth_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": {"message": "invalid api key"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = CompletionRequest::new("Qwen-32B", vec![Message::user("hi")], 50);
        let err = backend.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(ref m) if m.contains("invalid api key")));
    }

    #[tokio::test]
    async fn test_complete_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(3)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = CompletionRequest::new("Qwen-32B", vec![Message::user("hi")], 50);
        let err = backend.complete(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimit(_)));
    }
}
