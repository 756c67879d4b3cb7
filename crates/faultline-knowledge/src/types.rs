//! Incident cases and retrieval results.

use serde::{Deserialize, Serialize};

fn default_severity() -> String {
    "medium".to_string()
}

/// A historical incident: an error signature paired with its diagnosed
/// root cause and remedy. Loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCase {
    pub error_type: String,
    #[serde(default)]
    pub log_content: String,
    pub root_cause: String,
    pub solution: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

impl IncidentCase {
    pub fn new(
        error_type: impl Into<String>,
        log_content: impl Into<String>,
        root_cause: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            log_content: log_content.into(),
            root_cause: root_cause.into(),
            solution: solution.into(),
            severity: default_severity(),
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    /// The text embedded for the vector tiers.
    pub fn document_text(&self) -> String {
        format!(
            "错误类型: {}\n日志内容: {}\n根本原因: {}\n解决方案: {}",
            self.error_type, self.log_content, self.root_cause, self.solution
        )
    }

    /// The text the lexical tier matches against.
    pub fn lexical_text(&self) -> String {
        format!(
            "{} {} {}",
            self.error_type, self.log_content, self.root_cause
        )
    }
}

/// An incident case returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCase {
    #[serde(flatten)]
    pub case: IncidentCase,
    /// Similarity in `[0, 1]`, rounded to three decimals.
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    /// Indexed document text, present for vector-tier results.
    #[serde(skip)]
    pub content: Option<String>,
}

impl RetrievedCase {
    pub fn new(case: IncidentCase, similarity: f64) -> Self {
        Self {
            case,
            similarity: round3(similarity),
            rerank_score: None,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Text handed to the rerank service for this candidate.
    pub fn rerank_text(&self) -> String {
        match self.content {
            Some(ref content) if !content.is_empty() => content.clone(),
            _ => format!("{} {}", self.case.error_type, self.case.root_cause),
        }
    }

    /// Rerank score when present, otherwise similarity.
    pub fn score(&self) -> f64 {
        self.rerank_score.unwrap_or(self.similarity)
    }
}

/// Convert an L2 distance to a similarity in `(0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f64 {
    1.0 / (1.0 + f64::from(distance.max(0.0)))
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
