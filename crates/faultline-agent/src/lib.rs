//! Diagnosis for Faultline.
//!
//! Two ways to diagnose an incident:
//!
//! - [`DiagnosisPipeline`]: retrieve similar historical cases, ask the model
//!   for a structured answer, and fall back to the best case when the model
//!   is unavailable or unparsable.
//! - [`ToolCallingAgent`]: let the model run read-only commands on the
//!   target host through [`RemoteExecutionTool`] before concluding, bounded
//!   by an iteration limit. [`StreamingMonitor`] exposes each step as a
//!   [`StreamEvent`] while the run is in progress.
//!
//! Neither path returns an error to its caller; failures become degraded
//! results.

pub mod agent;
pub mod error;
pub mod json;
pub mod log;
pub mod pipeline;
pub mod prompt;
pub mod remote;
pub mod stream;
pub mod types;

pub use agent::{TOOL_NAME, ToolCallingAgent};
pub use error::{AgentError, Result};
pub use json::extract_json_object;
pub use log::{ExecutionLogEntry, ExecutionSink};
pub use pipeline::{DiagnosisPipeline, PipelineOptions};
pub use remote::{
    CommandPolicy, RemoteExecutionTool, RemoteShell, SharedShell, ShellOutput, SshConfig, SshShell,
};
pub use stream::{EventStream, StreamEvent, StreamingMonitor};
pub use types::{AgentDiagnosis, CommandResult, DiagnosisResult};

#[cfg(any(test, feature = "testing"))]
pub use remote::ScriptedShell;
