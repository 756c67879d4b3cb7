//! Relevance scoring service client.
//!
//! A rerank service takes a query and a list of candidate documents and
//! returns `(original_index, relevance_score)` pairs, best first.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result, status_error};

/// One scored candidate, addressed by its position in the request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f64,
}

/// Trait for relevance scoring services.
#[async_trait]
pub trait RerankService: Send + Sync {
    /// Score `documents` against `query`, returning at most `top_n` entries
    /// in the service's preferred order.
    async fn score(&self, query: &str, documents: &[String], top_n: usize)
    -> Result<Vec<RerankScore>>;

    fn name(&self) -> &str;
}

pub type SharedReranker = Arc<dyn RerankService>;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Reranker
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a `/rerank` endpoint (SiliconFlow / Jina / Cohere shape).
#[derive(Debug, Clone)]
pub struct HttpRerankerConfig {
    pub api_key: Option<String>,
    /// Base URL, without the `/rerank` suffix.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl HttpRerankerConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpReranker {
    client: Client,
    config: HttpRerankerConfig,
}

impl HttpReranker {
    pub fn new(config: HttpRerankerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn rerank_url(&self) -> String {
        format!("{}/rerank", self.config.base_url.trim_end_matches('/'))
    }

    /// Probe the endpoint with a one-document request.
    pub async fn health_check(&self) -> Result<()> {
        self.score("ping", &["pong".to_string()], 1).await.map(|_| ())
    }
}

#[async_trait]
impl RerankService for HttpReranker {
    async fn score(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n,
        };

        let mut builder = self.client.post(self.rerank_url()).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, None));
        }

        let parsed: RerankResponse = response.json().await?;
        tracing::debug!(
            model = %self.config.model,
            candidates = documents.len(),
            scored = parsed.results.len(),
            "Rerank complete"
        );
        Ok(parsed.results)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<RerankScore>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Reranker
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted reranker for tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct MockReranker {
    scores: Option<Vec<RerankScore>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "testing"))]
impl MockReranker {
    /// Return these scores verbatim (truncated to `top_n`).
    pub fn with_scores(scores: Vec<(usize, f64)>) -> Self {
        Self {
            scores: Some(
                scores
                    .into_iter()
                    .map(|(index, relevance_score)| RerankScore {
                        index,
                        relevance_score,
                    })
                    .collect(),
            ),
            calls: Default::default(),
        }
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl RerankService for MockReranker {
    async fn score(
        &self,
        _query: &str,
        _documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.scores {
            Some(ref scores) => Ok(scores.iter().copied().take(top_n).collect()),
            None => Err(LlmError::Network("MockReranker: unreachable".to_string())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_reranker_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/rerank"))
            .and(body_partial_json(json!({
                "model": "BAAI/bge-reranker-v2-m3",
                "query": "redis timeout",
                "top_n": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "r1",
                "results": [
                    {"index": 2, "relevance_score": 0.91},
                    {"index": 0, "relevance_score": 0.40}
                ]
            })))
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(HttpRerankerConfig::new(
            format!("{}/v1", server.uri()),
            "BAAI/bge-reranker-v2-m3",
        ))
        .unwrap();

        let docs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let scores = reranker.score("redis timeout", &docs, 2).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].index, 2);
        assert!((scores[0].relevance_score - 0.91).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_http_reranker_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reranker = HttpReranker::new(HttpRerankerConfig::new(server.uri(), "m")).unwrap();
        assert!(reranker.score("q", &["d".to_string()], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_reranker_truncates() {
        let reranker = MockReranker::with_scores(vec![(1, 0.9), (0, 0.5), (2, 0.1)]);
        let scores = reranker.score("q", &[], 2).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(reranker.call_count(), 1);
    }
}
