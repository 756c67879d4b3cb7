//! The tool-calling diagnosis loop.
//!
//! ```text
//! Reasoning ──tool_use──▶ ToolInvocation ──result──▶ Reasoning ─ ─ ▶ ...
//!     │                                                  │
//!     └──── text answer ──▶ Concluded        max_iterations ──▶ Concluded (partial)
//! ```
//!
//! Tool calls run one at a time; every command and every result goes
//! through the run's [`ExecutionSink`] before the loop moves on.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use faultline_config::AgentConfig;
use faultline_llm::{
    CompletionRequest, Message, SharedBackend, ToolDefinition, ToolResultBlock, ToolUseBlock,
};

use crate::error::{AgentError, Result};
use crate::json::{coerce_confidence, extract_json_object, value_text};
use crate::log::{ExecutionLogEntry, ExecutionSink};
use crate::prompt::{AGENT_SYSTEM_PROMPT, agent_prompt, tool_description};
use crate::remote::RemoteExecutionTool;
use crate::types::{AgentDiagnosis, CommandResult};

/// Name of the single tool offered to the model.
pub const TOOL_NAME: &str = "execute_ssh_command";

const DEFAULT_AGENT_CONFIDENCE: f64 = 0.85;
const EXHAUSTED_CONFIDENCE: f64 = 0.3;
const EXHAUSTED_SUMMARY_OUTPUTS: usize = 3;

/// Bounded reasoning loop that may run diagnostic commands before answering.
pub struct ToolCallingAgent {
    backend: SharedBackend,
    tool: Arc<RemoteExecutionTool>,
    config: AgentConfig,
}

impl ToolCallingAgent {
    pub fn new(backend: SharedBackend, tool: Arc<RemoteExecutionTool>, config: AgentConfig) -> Self {
        Self {
            backend,
            tool,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Diagnose without streaming. Never fails: errors become
    /// [`AgentDiagnosis::failed`].
    pub async fn diagnose(&self, error_text: &str) -> AgentDiagnosis {
        let mut sink = ExecutionSink::detached();
        match self.run(error_text, &mut sink, &CancellationToken::new()).await {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                tracing::error!(error = %e, "Agent run failed");
                AgentDiagnosis::failed(e)
            }
        }
    }

    /// Run the loop, appending every step to `sink`.
    ///
    /// Returns `Err` on model failure or cancellation; the iteration bound
    /// yields a partial `Ok` result instead.
    pub async fn run(
        &self,
        error_text: &str,
        sink: &mut ExecutionSink,
        cancel: &CancellationToken,
    ) -> Result<AgentDiagnosis> {
        if !self.backend.supports_native_tools() {
            return Err(AgentError::ToolsUnsupported(self.backend.name().to_string()));
        }

        tracing::info!(
            target_host = %self.tool.target(),
            max_iterations = self.config.max_iterations,
            error_len = error_text.len(),
            "Agent run started"
        );

        let tools = vec![self.tool_definition()];
        let mut messages = vec![Message::user(agent_prompt(error_text))];
        let mut tool_calls: Vec<String> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();

        for iteration in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let request = CompletionRequest::new(
                self.backend.default_model(),
                messages.clone(),
                self.config.max_tokens,
            )
            .with_system(AGENT_SYSTEM_PROMPT)
            .with_tools(tools.clone())
            .with_temperature(self.config.temperature);

            tracing::debug!(iteration, messages = messages.len(), "Calling LLM");
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.backend.complete(request) => response?,
            };

            let tool_uses = response.tool_uses();
            if tool_uses.is_empty() {
                let diagnosis = conclude(&response.text(), tool_calls);
                tracing::info!(
                    iteration,
                    commands = diagnosis.tool_calls.len(),
                    confidence = diagnosis.confidence,
                    "Agent concluded"
                );
                return Ok(diagnosis);
            }

            tracing::info!(iteration, tool_count = tool_uses.len(), "Executing tools");
            messages.push(Message::assistant_blocks(response.content.clone()));

            let mut results = Vec::with_capacity(tool_uses.len());
            for tool_use in tool_uses {
                let block = match command_argument(&tool_use) {
                    Ok(command) => {
                        sink.record(ExecutionLogEntry::Command {
                            text: command.clone(),
                        })
                        .await;
                        tool_calls.push(command.clone());

                        let result: CommandResult = tokio::select! {
                            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                            result = self.tool.execute(&command) => result,
                        };
                        let text = result.tool_output();
                        sink.record(ExecutionLogEntry::Result {
                            text: text.clone(),
                            success: result.success,
                            exit_code: result.exit_code,
                        })
                        .await;
                        outputs.push(text.clone());

                        if result.success {
                            ToolResultBlock::success(&tool_use.id, text)
                        } else {
                            ToolResultBlock::error(&tool_use.id, text)
                        }
                    }
                    Err(e) => {
                        tracing::warn!(tool = %tool_use.name, error = %e, "Malformed tool call");
                        let text = e.to_string();
                        sink.record(ExecutionLogEntry::Error { text: text.clone() })
                            .await;
                        ToolResultBlock::error(&tool_use.id, text)
                    }
                };
                results.push(block);
            }
            messages.push(Message::tool_results(results));
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            commands = tool_calls.len(),
            "Agent reached max iterations"
        );
        Ok(exhausted(&outputs, tool_calls))
    }

    fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            TOOL_NAME,
            tool_description(&self.tool.target()),
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "要在远程服务器上执行的 Shell 命令"
                    }
                },
                "required": ["command"]
            }),
        )
    }
}

fn command_argument(tool_use: &ToolUseBlock) -> Result<String> {
    if tool_use.name != TOOL_NAME {
        return Err(AgentError::InvalidToolParams(format!(
            "unknown tool '{}', only '{TOOL_NAME}' is available",
            tool_use.name
        )));
    }
    match tool_use.input.get("command") {
        Some(Value::String(command)) if !command.trim().is_empty() => Ok(command.clone()),
        _ => Err(AgentError::InvalidToolParams(
            "'command' must be a non-empty string".to_string(),
        )),
    }
}

/// Coerce the model's terminal answer.
fn conclude(text: &str, tool_calls: Vec<String>) -> AgentDiagnosis {
    match extract_json_object(text) {
        Some(Value::Object(map)) if map.contains_key("diagnosis") => AgentDiagnosis {
            diagnosis: value_text(map.get("diagnosis")),
            root_cause: value_text(map.get("root_cause")),
            solution: value_text(map.get("solution")),
            confidence: coerce_confidence(map.get("confidence"), DEFAULT_AGENT_CONFIDENCE),
            tool_calls,
        },
        _ => AgentDiagnosis {
            diagnosis: "Agent 自动诊断".to_string(),
            root_cause: text.trim().to_string(),
            solution: "参见 Agent 分析结果".to_string(),
            confidence: DEFAULT_AGENT_CONFIDENCE,
            tool_calls,
        },
    }
}

/// The partial answer when the iteration bound is hit.
fn exhausted(outputs: &[String], tool_calls: Vec<String>) -> AgentDiagnosis {
    let start = outputs.len().saturating_sub(EXHAUSTED_SUMMARY_OUTPUTS);
    let root_cause = if outputs.is_empty() {
        "未收集到任何命令输出".to_string()
    } else {
        format!("已收集的命令输出:\n{}", outputs[start..].join("\n\n"))
    };

    AgentDiagnosis {
        diagnosis: "Agent 达到最大迭代次数".to_string(),
        root_cause,
        solution: "请根据已收集的命令输出继续人工排查".to_string(),
        confidence: if outputs.is_empty() {
            0.0
        } else {
            EXHAUSTED_CONFIDENCE
        },
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CommandPolicy, ScriptedShell};
    use faultline_llm::MockBackend;
    use std::time::Duration;

    fn agent(backend: MockBackend, shell: ScriptedShell, max_iterations: u32) -> ToolCallingAgent {
        let tool = RemoteExecutionTool::new(
            Arc::new(shell),
            CommandPolicy::new(Vec::new(), vec!["rm -rf".to_string()]),
            Duration::from_secs(5),
        );
        ToolCallingAgent::new(
            Arc::new(backend),
            Arc::new(tool),
            AgentConfig {
                max_iterations,
                ..AgentConfig::default()
            },
        )
    }

    fn call(id: &str, command: &str) -> faultline_llm::CompletionResponse {
        MockBackend::tool_use_response(id, TOOL_NAME, json!({ "command": command }))
    }

    #[tokio::test]
    async fn test_direct_answer_without_tools() {
        let backend = MockBackend::with_text(
            r#"{"diagnosis": "磁盘已满", "root_cause": "日志未轮转", "solution": ["清理日志", "配置 logrotate"], "confidence": 0.8}"#,
        );
        let result = agent(backend, ScriptedShell::new(), 5).diagnose("No space left on device").await;

        assert_eq!(result.diagnosis, "磁盘已满");
        assert_eq!(result.solution, "清理日志\n配置 logrotate");
        assert_eq!(result.confidence, 0.8);
        assert!(result.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_then_answer_logs_in_order() {
        let backend = MockBackend::new(vec![
            call("t1", "systemctl status mysql"),
            MockBackend::text_response(
                r#"{"diagnosis": "MySQL 未运行", "root_cause": "服务停止", "solution": "systemctl start mysql"}"#,
            ),
        ]);
        let shell = ScriptedShell::new().reply("systemctl status mysql", 3, "", "inactive (dead)");
        let agent = agent(backend, shell, 5);

        let mut sink = ExecutionSink::detached();
        let result = agent
            .run("ERROR 2003", &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tool_calls, vec!["systemctl status mysql"]);
        assert_eq!(result.confidence, DEFAULT_AGENT_CONFIDENCE);
        assert_eq!(
            sink.entries(),
            &[
                ExecutionLogEntry::Command {
                    text: "systemctl status mysql".to_string()
                },
                ExecutionLogEntry::Result {
                    text: "✗ 命令执行失败 (退出码: 3):\ninactive (dead)".to_string(),
                    success: false,
                    exit_code: 3,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_result_fed_back_to_model() {
        let backend = Arc::new(MockBackend::new(vec![
            call("t1", "df -h"),
            MockBackend::text_response("磁盘空间充足"),
        ]));
        let tool = RemoteExecutionTool::new(
            Arc::new(ScriptedShell::new().reply("df -h", 0, "/dev/sda1 40%\n", "")),
            CommandPolicy::default(),
            Duration::from_secs(5),
        );
        let agent = ToolCallingAgent::new(backend.clone(), Arc::new(tool), AgentConfig::default());
        let result = agent.diagnose("disk alert").await;

        assert_eq!(result.diagnosis, "Agent 自动诊断");
        assert_eq!(result.root_cause, "磁盘空间充足");

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tools[0].name, TOOL_NAME);
        assert_eq!(requests[0].temperature, Some(0.3));
        let last = requests[1].messages.last().unwrap();
        let blocks = last.content.blocks();
        assert!(matches!(
            &blocks[0],
            faultline_llm::ContentBlock::ToolResult { content, is_error: false, .. }
                if content == "✓ 命令执行成功:\n/dev/sda1 40%"
        ));
    }

    #[tokio::test]
    async fn test_malformed_tool_call_reported() {
        let backend = MockBackend::new(vec![
            MockBackend::tool_use_response("t1", TOOL_NAME, json!({ "cmd": 42 })),
            MockBackend::text_response(r#"{"diagnosis": "未知"}"#),
        ]);
        let agent = agent(backend, ScriptedShell::new(), 5);
        let mut sink = ExecutionSink::detached();
        let result = agent
            .run("x", &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.tool_calls.is_empty());
        assert_eq!(sink.len(), 1);
        assert!(matches!(&sink.entries()[0], ExecutionLogEntry::Error { text } if text.contains("command")));
    }

    #[tokio::test]
    async fn test_iteration_bound() {
        let backend = MockBackend::new(vec![
            call("t1", "uptime"),
            call("t2", "free -h"),
            call("t3", "uptime"),
        ]);
        let shell = ScriptedShell::new()
            .reply("uptime", 0, "load average: 9.1", "")
            .reply("free -h", 0, "Mem: 1.0Gi", "");
        let result = agent(backend, shell, 2).diagnose("high load").await;

        assert_eq!(result.diagnosis, "Agent 达到最大迭代次数");
        assert_eq!(result.confidence, EXHAUSTED_CONFIDENCE);
        assert_eq!(result.tool_calls, vec!["uptime", "free -h"]);
        assert!(result.root_cause.contains("Mem: 1.0Gi"));
    }

    #[tokio::test]
    async fn test_iteration_bound_without_outputs() {
        let backend = MockBackend::new(vec![MockBackend::tool_use_response(
            "t1",
            "read_file",
            json!({}),
        )]);
        let result = agent(backend, ScriptedShell::new(), 1).diagnose("x").await;
        assert_eq!(result.diagnosis, "Agent 达到最大迭代次数");
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_model_failure_degrades() {
        let result = agent(MockBackend::failing("connection reset"), ScriptedShell::new(), 5)
            .diagnose("x")
            .await;
        assert_eq!(result.diagnosis, "Agent 诊断失败");
        assert!(result.root_cause.contains("connection reset"));
        assert_eq!(result.confidence, 0.0);
        assert!(result.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_backend_without_tools_fails_before_calling() {
        let backend = Arc::new(MockBackend::with_text("{}").without_native_tools());
        let tool = RemoteExecutionTool::new(
            Arc::new(ScriptedShell::new()),
            CommandPolicy::new(Vec::new(), Vec::new()),
            Duration::from_secs(5),
        );
        let agent = ToolCallingAgent::new(backend.clone(), Arc::new(tool), AgentConfig::default());

        let result = agent.diagnose("nginx 502").await;
        assert_eq!(result.diagnosis, "Agent 诊断失败");
        assert!(result.root_cause.contains("does not support tool calling"));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let agent = agent(MockBackend::with_text("{}"), ScriptedShell::new(), 5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = agent
            .run("x", &mut ExecutionSink::detached(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[test]
    fn test_conclude_string_confidence() {
        let d = conclude(r#"{"diagnosis": "a", "confidence": "0.6"}"#, Vec::new());
        assert_eq!(d.confidence, 0.6);
        let d = conclude(r#"{"diagnosis": "a", "confidence": "high"}"#, Vec::new());
        assert_eq!(d.confidence, DEFAULT_AGENT_CONFIDENCE);
    }
}
