//! Embeddings for vector retrieval over the incident corpus.
//!
//! # Implementations
//!
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint (bge-m3 by default)
//! - [`MockEmbedder`]: deterministic embeddings for testing

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result, status_error};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

/// Euclidean (L2) distance between two vectors of equal length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: Option<String>,
    /// Base URL, without the `/embeddings` suffix.
    pub base_url: String,
    pub model: String,
    /// Expected output width; responses of another width are rejected.
    pub dimensions: usize,
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
            timeout: Duration::from_secs(30),
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

/// Embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    /// Probe the endpoint with a short input.
    pub async fn health_check(&self) -> Result<()> {
        self.embed("health check").await.map(|_| ())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut builder = self.client.post(self.embeddings_url()).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(
                status,
                format!("Embedding request failed: {}", body),
                None,
            ));
        }

        let result: EmbeddingResponse = response.json().await?;

        if result.data.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct order
        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        for e in &embeddings {
            if e.embedding.len() != self.config.dimensions {
                return Err(LlmError::InvalidResponse(format!(
                    "embedding has {} dimensions, expected {}",
                    e.embedding.len(),
                    self.config.dimensions
                )));
            }
        }

        tracing::debug!(
            model = %self.config.model,
            count = embeddings.len(),
            "Generated embeddings"
        );

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder for testing purposes.
///
/// Generates deterministic, unit-length embeddings from a hash of the text,
/// so identical texts land at distance zero. Can be switched to fail every
/// call to exercise fallback paths.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    fail: bool,
}

#[cfg(any(test, feature = "testing"))]
impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: false,
        }
    }

    /// An embedder whose every call returns a network error.
    pub fn failing(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: true,
        }
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(LlmError::Network("MockEmbedder: unreachable".to_string()));
        }

        let mut state = simple_hash(text);
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as u32 as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(any(test, feature = "testing"))]
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed("mysql connection refused").await.unwrap();
        let b = embedder.embed("mysql connection refused").await.unwrap();
        let c = embedder.embed("disk full").await.unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(euclidean_distance(&a, &b) < 1e-6);
    }

    #[tokio::test]
    async fn test_mock_embedder_failing() {
        let embedder = MockEmbedder::failing(8);
        assert!(embedder.embed("x").await.is_err());
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_openai_embedder_sorts_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let config = OpenAiEmbedderConfig::new(format!("{}/v1", server.uri()), "bge", 2);
        let embedder = OpenAiEmbedder::new(config).unwrap();
        let out = embedder.embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_openai_embedder_rejects_wrong_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let embedder =
            OpenAiEmbedder::new(OpenAiEmbedderConfig::new(server.uri(), "bge", 1024)).unwrap();
        let err = embedder.embed("a").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_openai_embedder_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let embedder =
            OpenAiEmbedder::new(OpenAiEmbedderConfig::new(server.uri(), "bge", 2)).unwrap();
        let err = embedder.embed("a").await.unwrap_err();
        assert!(matches!(err, LlmError::Backend(_)));
    }
}
