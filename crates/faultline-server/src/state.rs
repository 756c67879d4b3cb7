//! Application state shared across handlers.

use std::sync::Arc;

use faultline_agent::{DiagnosisPipeline, StreamingMonitor, ToolCallingAgent};

use crate::config::ServerConfig;

/// Application state shared across all handlers.
///
/// Everything here is read-only after startup; each request builds its own
/// execution log and event channel.
#[derive(Clone)]
pub struct AppState {
    /// Retrieval-augmented diagnosis.
    pub pipeline: Arc<DiagnosisPipeline>,

    /// Tool-calling agent, shared with the streaming monitor.
    pub agent: Arc<ToolCallingAgent>,

    /// Spawns streaming agent runs.
    pub monitor: Arc<StreamingMonitor>,

    /// Number of incident cases loaded at startup.
    pub knowledge_cases: usize,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        pipeline: DiagnosisPipeline,
        agent: ToolCallingAgent,
        knowledge_cases: usize,
        config: ServerConfig,
    ) -> Self {
        let agent = Arc::new(agent);
        Self {
            pipeline: Arc::new(pipeline),
            monitor: Arc::new(StreamingMonitor::new(agent.clone())),
            agent,
            knowledge_cases,
            config: Arc::new(config),
        }
    }
}
