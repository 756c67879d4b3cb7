//! Remote vector store over the Milvus v2 REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{KnowledgeError, Result};
use crate::store::{StoredDocument, VectorHit, VectorStore, check_lengths};
use crate::types::IncidentCase;

const OUTPUT_FIELDS: [&str; 7] = [
    "id",
    "content",
    "error_type",
    "log_content",
    "root_cause",
    "solution",
    "severity",
];

/// Connection settings for a Milvus collection.
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    /// Server root, e.g. `http://localhost:19530`.
    pub url: String,
    pub collection: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl MilvusConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection: collection.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Milvus-backed store. One HTTP request per operation; no client state
/// beyond the connection pool.
pub struct MilvusStore {
    client: Client,
    config: MilvusConfig,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    #[serde(default)]
    distance: f32,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    log_content: String,
    #[serde(default)]
    root_cause: String,
    #[serde(default)]
    solution: String,
    #[serde(default)]
    severity: Option<String>,
}

impl SearchRow {
    fn into_hit(self) -> VectorHit {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        VectorHit {
            document: StoredDocument {
                id,
                content: self.content,
                case: IncidentCase {
                    error_type: self.error_type,
                    log_content: self.log_content,
                    root_cause: self.root_cause,
                    solution: self.solution,
                    severity: self.severity.unwrap_or_else(|| "medium".to_string()),
                },
            },
            distance: self.distance,
        }
    }
}

impl MilvusStore {
    pub fn new(config: MilvusConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>> {
        let mut builder = self.client.post(self.endpoint(path)).json(&body);
        if let Some(ref token) = self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?.error_for_status()?;
        let envelope: Envelope<T> = response.json().await?;
        if envelope.code != 0 {
            return Err(KnowledgeError::VectorStore {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    /// Create the collection (L2 metric, string primary key) if it is missing.
    pub async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let exists: Option<HasCollection> = self
            .call(
                "collections/has",
                json!({ "collectionName": self.config.collection }),
            )
            .await?;
        if exists.is_some_and(|h| h.has) {
            return Ok(());
        }

        self.call::<Value>(
            "collections/create",
            json!({
                "collectionName": self.config.collection,
                "dimension": dims,
                "metricType": "L2",
                "idType": "VarChar",
                "primaryFieldName": "id",
                "vectorFieldName": "vector",
                "params": { "max_length": 64 },
            }),
        )
        .await?;

        info!(collection = %self.config.collection, dims, "Created Milvus collection");
        Ok(())
    }

    /// Round-trip a cheap request to confirm the server is reachable.
    pub async fn health_check(&self) -> Result<()> {
        self.call::<Value>("collections/list", json!({})).await.map(|_| ())
    }
}

#[async_trait]
impl VectorStore for MilvusStore {
    fn name(&self) -> &str {
        "milvus"
    }

    async fn upsert(&self, documents: &[StoredDocument], embeddings: &[Vec<f32>]) -> Result<()> {
        check_lengths(documents, embeddings)?;
        if documents.is_empty() {
            return Ok(());
        }

        let data: Vec<Value> = documents
            .iter()
            .zip(embeddings)
            .map(|(doc, vector)| {
                json!({
                    "id": doc.id,
                    "vector": vector,
                    "content": doc.content,
                    "error_type": doc.case.error_type,
                    "log_content": doc.case.log_content,
                    "root_cause": doc.case.root_cause,
                    "solution": doc.case.solution,
                    "severity": doc.case.severity,
                })
            })
            .collect();

        self.call::<Value>(
            "entities/upsert",
            json!({ "collectionName": self.config.collection, "data": data }),
        )
        .await?;

        info!(
            collection = %self.config.collection,
            count = documents.len(),
            "Upserted documents to Milvus"
        );
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows: Option<Vec<SearchRow>> = self
            .call(
                "entities/search",
                json!({
                    "collectionName": self.config.collection,
                    "data": [query],
                    "annsField": "vector",
                    "limit": k,
                    "outputFields": OUTPUT_FIELDS,
                }),
            )
            .await?;

        let mut hits: Vec<VectorHit> = rows
            .unwrap_or_default()
            .into_iter()
            .map(SearchRow::into_hit)
            .collect();
        hits.truncate(k);

        debug!(hits = hits.len(), limit = k, "Milvus search");
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let rows: Option<Vec<Value>> = self
            .call(
                "entities/query",
                json!({
                    "collectionName": self.config.collection,
                    "filter": "",
                    "outputFields": ["count(*)"],
                }),
            )
            .await?;

        let count = rows
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.get("count(*)").and_then(Value::as_u64))
            .unwrap_or(0);
        Ok(count as usize)
    }
}
