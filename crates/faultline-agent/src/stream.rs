//! Streaming progress for agent runs.
//!
//! [`StreamingMonitor::run`] spawns the agent on a background task and
//! returns an [`EventStream`]. The task's [`ExecutionSink`] pushes one event
//! per log entry into a bounded channel; once the channel drains, the
//! stream emits exactly one terminal event taken from the task's outcome.
//!
//! Dropping the stream cancels the run.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::agent::ToolCallingAgent;
use crate::log::ExecutionSink;
use crate::types::AgentDiagnosis;

// ─────────────────────────────────────────────────────────────────────────────
// Stream Event
// ─────────────────────────────────────────────────────────────────────────────

/// One unit of observable progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The run has started.
    Thinking { message: String },
    /// A command was issued.
    ToolCall { command: String },
    /// A command returned, or a tool call could not be executed.
    ToolResult { content: String, success: bool },
    /// Terminal: the run concluded.
    FinalResult { result: AgentDiagnosis },
    /// Terminal: the run failed.
    Error { message: String },
}

impl StreamEvent {
    pub fn thinking(message: impl Into<String>) -> Self {
        Self::Thinking {
            message: message.into(),
        }
    }

    pub fn tool_call(command: impl Into<String>) -> Self {
        Self::ToolCall {
            command: command.into(),
        }
    }

    pub fn tool_result(content: impl Into<String>, success: bool) -> Self {
        Self::ToolResult {
            content: content.into(),
            success,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The wire name of this event (`type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::FinalResult { .. } => "final_result",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalResult { .. } | Self::Error { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Stream
// ─────────────────────────────────────────────────────────────────────────────

/// Events of one agent run. Cancels the run when dropped.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>,
    _cancel_on_drop: DropGuard,
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Monitor
// ─────────────────────────────────────────────────────────────────────────────

pub struct StreamingMonitor {
    agent: Arc<ToolCallingAgent>,
    buffer: usize,
}

impl StreamingMonitor {
    pub fn new(agent: Arc<ToolCallingAgent>) -> Self {
        let buffer = agent.config().event_buffer.max(1);
        Self { agent, buffer }
    }

    pub fn agent(&self) -> &Arc<ToolCallingAgent> {
        &self.agent
    }

    /// Start a run for `error_text` and stream its progress.
    ///
    /// Must be called inside a tokio runtime.
    pub fn run(&self, error_text: impl Into<String>) -> EventStream {
        let error_text = error_text.into();
        let (tx, mut rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();

        let agent = self.agent.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut sink = ExecutionSink::streaming(tx);
            agent.run(&error_text, &mut sink, &task_cancel).await
        });

        let inner = async_stream::stream! {
            yield StreamEvent::thinking("Agent 开始分析故障...");

            while let Some(event) = rx.recv().await {
                yield event;
            }

            // The sender lives in the task, so the channel closes only when
            // the task has finished.
            match handle.await {
                Ok(Ok(result)) => yield StreamEvent::FinalResult { result },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Streaming agent run failed");
                    yield StreamEvent::error(e.to_string());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Streaming agent task aborted");
                    yield StreamEvent::error(format!("agent task aborted: {e}"));
                }
            }
        };

        EventStream {
            inner: Box::pin(inner),
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}
