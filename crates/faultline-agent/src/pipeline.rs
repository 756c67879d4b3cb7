//! Retrieval-augmented diagnosis.
//!
//! `search → rerank → evidence → model → parse`, with a heuristic answer
//! from the best retrieved case whenever the model call or the parse fails.

use serde_json::Value;
use std::sync::Arc;

use faultline_config::FaultlineConfig;
use faultline_knowledge::{Reranker, RetrievedCase, VectorIndex};
use faultline_llm::{CompletionRequest, Message, SharedBackend};

use crate::json::{coerce_confidence, extract_json_object, value_text};
use crate::prompt::{DIAGNOSIS_SYSTEM_PROMPT, diagnosis_prompt, format_evidence};
use crate::types::DiagnosisResult;

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Knobs for the model call and retrieval depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &FaultlineConfig) -> Self {
        let llm = config.llm();
        Self {
            top_k: config.pipeline().top_k,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }
}

pub struct DiagnosisPipeline {
    index: Arc<VectorIndex>,
    reranker: Reranker,
    backend: SharedBackend,
    options: PipelineOptions,
}

impl DiagnosisPipeline {
    pub fn new(
        index: Arc<VectorIndex>,
        reranker: Reranker,
        backend: SharedBackend,
        options: PipelineOptions,
    ) -> Self {
        Self {
            index,
            reranker,
            backend,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Diagnose with the configured retrieval depth.
    pub async fn diagnose(&self, error_text: &str) -> DiagnosisResult {
        self.diagnose_with_top_k(error_text, self.options.top_k).await
    }

    /// Diagnose `error_text`. Never fails; degraded paths still return a
    /// result with confidence in `[0, 1]`.
    pub async fn diagnose_with_top_k(&self, error_text: &str, top_k: usize) -> DiagnosisResult {
        let mut cases = self.index.search(error_text, top_k).await;
        if self.reranker.is_enabled() {
            cases = self.reranker.rerank(error_text, cases).await;
        }
        tracing::debug!(top_k, retrieved = cases.len(), "Evidence gathered");

        let prompt = diagnosis_prompt(error_text, &format_evidence(&cases));
        let request = CompletionRequest::new(
            self.backend.default_model(),
            vec![Message::user(prompt)],
            self.options.max_tokens,
        )
        .with_system(DIAGNOSIS_SYSTEM_PROMPT)
        .with_temperature(self.options.temperature);

        let text = match self.backend.complete(request).await {
            Ok(response) => response.text(),
            Err(e) => {
                tracing::warn!(error = %e, "LLM call failed, answering from retrieved cases");
                return DiagnosisResult::from_top_case(cases);
            }
        };

        match parse_diagnosis(&text, cases) {
            Ok(result) => {
                tracing::info!(
                    confidence = result.confidence,
                    cases = result.retrieved_cases.len(),
                    "Diagnosis complete"
                );
                result
            }
            Err(cases) => {
                tracing::warn!(
                    response_len = text.len(),
                    "Unparsable model response, answering from retrieved cases"
                );
                DiagnosisResult::from_top_case(cases)
            }
        }
    }
}

/// Parse the model's JSON answer, handing the cases back on failure.
fn parse_diagnosis(
    text: &str,
    cases: Vec<RetrievedCase>,
) -> std::result::Result<DiagnosisResult, Vec<RetrievedCase>> {
    let Some(Value::Object(map)) = extract_json_object(text) else {
        return Err(cases);
    };

    Ok(DiagnosisResult {
        diagnosis: value_text(map.get("diagnosis")),
        root_cause: value_text(map.get("root_cause")),
        solution: value_text(map.get("solution")),
        confidence: coerce_confidence(map.get("confidence"), DEFAULT_CONFIDENCE),
        retrieved_cases: cases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_knowledge::{IncidentCase, LexicalSearch};
    use faultline_llm::{MockBackend, MockReranker};

    fn corpus() -> Vec<IncidentCase> {
        vec![
            IncidentCase::new(
                "MySQL connection refused",
                "connection refused on port 3306",
                "mysqld not running",
                "restart mysql service",
            )
            .with_severity("high"),
            IncidentCase::new(
                "Redis timeout",
                "redis connection timeout",
                "maxclients reached",
                "raise maxclients",
            ),
        ]
    }

    fn pipeline(cases: Vec<IncidentCase>, backend: MockBackend, reranker: Reranker) -> DiagnosisPipeline {
        let index = VectorIndex::lexical_only(LexicalSearch::new(Arc::new(cases)));
        DiagnosisPipeline::new(
            Arc::new(index),
            reranker,
            Arc::new(backend),
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_model_answer_used() {
        let backend = MockBackend::with_text(
            "```json\n{\"diagnosis\": \"MySQL 未启动\", \"root_cause\": \"mysqld 停止\", \"solution\": \"启动服务\", \"confidence\": 0.92}\n```",
        );
        let result = pipeline(corpus(), backend, Reranker::disabled(3))
            .diagnose("mysql connection refused")
            .await;

        assert_eq!(result.diagnosis, "MySQL 未启动");
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.retrieved_cases[0].case.error_type, "MySQL connection refused");
    }

    #[tokio::test]
    async fn test_unparsable_answer_falls_back_to_top_case() {
        let backend = MockBackend::with_text("抱歉，我无法判断");
        let result = pipeline(corpus(), backend, Reranker::disabled(3))
            .diagnose("mysql connection refused")
            .await;

        assert_eq!(result.diagnosis, "基于历史案例的诊断：MySQL connection refused");
        assert_eq!(result.root_cause, "mysqld not running");
        assert_eq!(result.confidence, result.retrieved_cases[0].similarity);
        assert!(result.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_model_failure_with_empty_corpus() {
        let result = pipeline(Vec::new(), MockBackend::failing("down"), Reranker::disabled(3))
            .diagnose("anything at all")
            .await;
        assert_eq!(result, DiagnosisResult::undiagnosable());
    }

    #[tokio::test]
    async fn test_bad_confidence_defaults() {
        let backend = MockBackend::with_text(r#"{"diagnosis": "d", "root_cause": "r", "solution": "s", "confidence": "very"}"#);
        let result = pipeline(corpus(), backend, Reranker::disabled(3))
            .diagnose("redis timeout")
            .await;
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_clamped() {
        let backend = MockBackend::with_text(r#"{"diagnosis": "d", "confidence": 7}"#);
        let result = pipeline(corpus(), backend, Reranker::disabled(3))
            .diagnose("redis timeout")
            .await;
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_reranked_order_attached() {
        let reranker = Reranker::new(Arc::new(MockReranker::with_scores(vec![(1, 0.97), (0, 0.2)])), 3);
        let backend = MockBackend::with_text("not json");
        let result = pipeline(corpus(), backend, reranker)
            .diagnose("connection refused timeout")
            .await;

        assert_eq!(result.retrieved_cases.len(), 2);
        assert_eq!(result.retrieved_cases[0].case.error_type, "Redis timeout");
        assert_eq!(result.confidence, 0.97);
    }

    #[tokio::test]
    async fn test_prompt_carries_evidence() {
        let backend = Arc::new(MockBackend::with_text("{}"));
        let index = VectorIndex::lexical_only(LexicalSearch::new(Arc::new(corpus())));
        let pipeline = DiagnosisPipeline::new(
            Arc::new(index),
            Reranker::disabled(3),
            backend.clone(),
            PipelineOptions::default(),
        );
        pipeline.diagnose_with_top_k("mysql refused", 1).await;

        let request = &backend.requests()[0];
        assert_eq!(request.system.as_deref(), Some(DIAGNOSIS_SYSTEM_PROMPT));
        let prompt = request.messages[0].content.as_text().unwrap();
        assert!(prompt.contains("案例1（相似度:"));
        assert!(!prompt.contains("案例2"));
    }
}
