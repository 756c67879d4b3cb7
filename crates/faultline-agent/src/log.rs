//! The per-run execution log.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// One step recorded during an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionLogEntry {
    /// A command was issued to the remote host.
    Command { text: String },
    /// The command came back, successfully or not.
    Result {
        text: String,
        success: bool,
        exit_code: i32,
    },
    /// The model's tool call could not be executed at all.
    Error { text: String },
}

impl ExecutionLogEntry {
    /// The stream event announcing this entry.
    pub fn to_event(&self) -> StreamEvent {
        match self {
            Self::Command { text } => StreamEvent::tool_call(text),
            Self::Result { text, success, .. } => StreamEvent::tool_result(text, *success),
            Self::Error { text } => StreamEvent::tool_result(text, false),
        }
    }
}

/// Append-only log owned by exactly one agent run.
///
/// Every appended entry is also forwarded, in order, to the run's event
/// channel when one is attached. The sink is the only writer, so stream
/// order is append order.
#[derive(Debug, Default)]
pub struct ExecutionSink {
    entries: Vec<ExecutionLogEntry>,
    events: Option<mpsc::Sender<StreamEvent>>,
}

impl ExecutionSink {
    /// A log nobody is watching.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A log whose entries are streamed to `events` as they are appended.
    pub fn streaming(events: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            entries: Vec::new(),
            events: Some(events),
        }
    }

    /// Append an entry. Waits for channel capacity; a consumer that went
    /// away does not stop the log.
    pub async fn record(&mut self, entry: ExecutionLogEntry) {
        if let Some(ref tx) = self.events {
            if tx.send(entry.to_event()).await.is_err() {
                tracing::debug!("Event consumer gone, continuing without streaming");
                self.events = None;
            }
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_forwarded_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = ExecutionSink::streaming(tx);

        sink.record(ExecutionLogEntry::Command {
            text: "df -h".to_string(),
        })
        .await;
        sink.record(ExecutionLogEntry::Result {
            text: "✓ 命令执行成功:\n/dev/sda1 40%".to_string(),
            success: true,
            exit_code: 0,
        })
        .await;
        sink.record(ExecutionLogEntry::Error {
            text: "missing command".to_string(),
        })
        .await;
        assert_eq!(sink.len(), 3);

        assert_eq!(rx.recv().await, Some(StreamEvent::tool_call("df -h")));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::ToolResult { success: true, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::ToolResult { success: false, .. })
        ));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_consumer_keeps_logging() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ExecutionSink::streaming(tx);
        sink.record(ExecutionLogEntry::Command {
            text: "uptime".to_string(),
        })
        .await;
        sink.record(ExecutionLogEntry::Command {
            text: "free -h".to_string(),
        })
        .await;
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_entry_serde_tag() {
        let entry = ExecutionLogEntry::Result {
            text: "ok".to_string(),
            success: true,
            exit_code: 0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["exit_code"], 0);
    }
}
