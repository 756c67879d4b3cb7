//! Synchronous diagnosis endpoints.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use faultline_agent::{AgentDiagnosis, DiagnosisResult};
use faultline_knowledge::RetrievedCase;

use crate::config::MAX_TOP_K;
use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for `POST /api/diagnose`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnoseRequest {
    /// Raw error log or incident description.
    pub error_log: String,

    /// Number of historical cases to retrieve.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Request body for the agent endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    pub error_log: String,
}

/// A retrieved case as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub error_type: String,
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    pub root_cause: String,
    pub solution: String,
}

impl From<&RetrievedCase> for CaseSummary {
    fn from(retrieved: &RetrievedCase) -> Self {
        Self {
            error_type: retrieved.case.error_type.clone(),
            similarity: retrieved.similarity,
            rerank_score: retrieved.rerank_score,
            root_cause: retrieved.case.root_cause.clone(),
            solution: retrieved.case.solution.clone(),
        }
    }
}

/// Response from `POST /api/diagnose`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnoseResponse {
    pub success: bool,
    pub diagnosis: String,
    pub root_cause: String,
    pub solution: String,
    pub confidence: f64,
    pub retrieved_cases: Vec<CaseSummary>,
}

impl From<DiagnosisResult> for DiagnoseResponse {
    fn from(result: DiagnosisResult) -> Self {
        Self {
            success: true,
            retrieved_cases: result.retrieved_cases.iter().map(CaseSummary::from).collect(),
            diagnosis: result.diagnosis,
            root_cause: result.root_cause,
            solution: result.solution,
            confidence: result.confidence,
        }
    }
}

pub(crate) fn require_error_log(error_log: &str) -> Result<(), ServerError> {
    if error_log.trim().is_empty() {
        return Err(ServerError::BadRequest(
            "error_log must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/diagnose - retrieval-augmented diagnosis.
pub async fn diagnose_handler(
    State(state): State<AppState>,
    Json(request): Json<DiagnoseRequest>,
) -> Result<Json<DiagnoseResponse>, ServerError> {
    require_error_log(&request.error_log)?;

    let top_k = request.top_k.unwrap_or(state.pipeline.options().top_k);
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(ServerError::BadRequest(format!(
            "top_k must be between 1 and {MAX_TOP_K}"
        )));
    }

    tracing::info!(top_k, error_len = request.error_log.len(), "Diagnosis requested");
    let result = state
        .pipeline
        .diagnose_with_top_k(&request.error_log, top_k)
        .await;

    Ok(Json(DiagnoseResponse::from(result)))
}

/// POST /api/diagnose/agent - tool-calling diagnosis, answered when done.
pub async fn agent_diagnose_handler(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> Result<Json<AgentDiagnosis>, ServerError> {
    require_error_log(&request.error_log)?;

    tracing::info!(error_len = request.error_log.len(), "Agent diagnosis requested");
    Ok(Json(state.agent.diagnose(&request.error_log).await))
}
