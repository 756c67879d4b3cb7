//! API routes.

pub mod diagnose;
pub mod health;
pub mod stream;

pub use diagnose::{
    AgentRequest, CaseSummary, DiagnoseRequest, DiagnoseResponse, agent_diagnose_handler,
    diagnose_handler,
};
pub use health::{HealthResponse, health_routes};
pub use stream::stream_handler;
