//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]            # chat completion service
//! [embedding]      # embedding service
//! [reranker]       # relevance scoring service
//! [vector_store]   # remote vector database
//! [knowledge]      # incident corpus
//! [remote]         # diagnostic host for the tool-calling agent
//! [agent]          # reasoning loop limits
//! [pipeline]       # retrieval defaults
//! [server]         # HTTP server
//! [logging]        # console / file logging
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default base URL shared by the hosted model services.
pub const DEFAULT_SERVICE_BASE: &str = "https://api.siliconflow.cn/v1";

/// Default chat model.
pub const DEFAULT_LLM_MODEL: &str = "Qwen/Qwen2.5-32B-Instruct";

/// Default embedding model and its output width.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-m3";
pub const DEFAULT_EMBEDDING_DIMS: usize = 1024;

/// Default reranking model.
pub const DEFAULT_RERANK_MODEL: &str = "BAAI/bge-reranker-v2-m3";

/// Default collection in the remote vector store.
pub const DEFAULT_COLLECTION: &str = "aiops_knowledge_v1";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8888;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Use the accessor methods to read
/// effective values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub reranker: Option<RerankerConfig>,
    pub vector_store: Option<VectorStoreConfig>,
    pub knowledge: Option<KnowledgeConfig>,
    pub remote: Option<RemoteConfig>,
    pub agent: Option<AgentConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub server: Option<ServerConfig>,
    pub logging: Option<LoggingConfig>,
}

impl FaultlineConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces the
    /// whole section here.
    pub fn merge(&mut self, other: FaultlineConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.reranker.is_some() {
            self.reranker = other.reranker;
        }
        if other.vector_store.is_some() {
            self.vector_store = other.vector_store;
        }
        if other.knowledge.is_some() {
            self.knowledge = other.knowledge;
        }
        if other.remote.is_some() {
            self.remote = other.remote;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.pipeline.is_some() {
            self.pipeline = other.pipeline;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> crate::Result<()> {
        let agent = self.agent();
        if agent.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "agent.max_iterations",
                "must be at least 1",
            ));
        }
        let reranker = self.reranker();
        if reranker.top_n == 0 {
            return Err(ConfigError::invalid("reranker.top_n", "must be at least 1"));
        }
        if self.pipeline().top_k == 0 {
            return Err(ConfigError::invalid("pipeline.top_k", "must be at least 1"));
        }
        if self.embedding().dimensions == 0 {
            return Err(ConfigError::invalid(
                "embedding.dimensions",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn reranker(&self) -> RerankerConfig {
        self.reranker.clone().unwrap_or_default()
    }

    pub fn vector_store(&self) -> VectorStoreConfig {
        self.vector_store.clone().unwrap_or_default()
    }

    pub fn knowledge(&self) -> KnowledgeConfig {
        self.knowledge.clone().unwrap_or_default()
    }

    pub fn remote(&self) -> RemoteConfig {
        self.remote.clone().unwrap_or_default()
    }

    pub fn agent(&self) -> AgentConfig {
        self.agent.clone().unwrap_or_default()
    }

    pub fn pipeline(&self) -> PipelineConfig {
        self.pipeline.clone().unwrap_or_default()
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Services
// ─────────────────────────────────────────────────────────────────────────────

/// `[llm]`: OpenAI-compatible chat completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Plaintext key; prefer `FAULTLINE_LLM_API_KEY`.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries for transient failures (network, rate limit).
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_BASE.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[embedding]`: OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMS,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[reranker]`: relevance scoring service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    /// When false the pipeline skips reranking and only truncates.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub top_n: usize,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_SERVICE_BASE.to_string(),
            model: DEFAULT_RERANK_MODEL.to_string(),
            top_n: 3,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl RerankerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────────────

/// `[vector_store]`: remote vector database (Milvus REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Disable to go straight to the local tier.
    pub enabled: bool,
    pub url: String,
    pub collection: String,
    /// Bearer token (`user:password` or an API key).
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Upsert the corpus into the collection at startup.
    pub sync_on_startup: bool,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:19530".to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            token: None,
            timeout_secs: 10,
            sync_on_startup: true,
        }
    }
}

impl VectorStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[knowledge]`: incident corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// JSON array of incident cases.
    pub corpus_path: PathBuf,
    /// Build the in-process vector index at startup.
    pub local_index: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/knowledge_base.json"),
            local_index: true,
        }
    }
}

/// `[pipeline]`: synchronous diagnosis defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cases retrieved when a request does not specify `top_k`.
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote Execution
// ─────────────────────────────────────────────────────────────────────────────

/// `[remote]`: the host the agent runs diagnostic commands on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Private key; the ssh client's default identities are used when unset.
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub exec_timeout_secs: u64,
    /// ssh client binary.
    pub ssh_binary: String,
    pub policy: CommandPolicyConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "192.168.30.18".to_string(),
            user: "root".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout_secs: 10,
            exec_timeout_secs: 30,
            ssh_binary: "ssh".to_string(),
            policy: CommandPolicyConfig::default(),
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

/// `[remote.policy]`: which model-generated commands may be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPolicyConfig {
    /// When non-empty, a command must start with one of these prefixes.
    pub allowed_prefixes: Vec<String>,
    /// Commands containing any of these substrings are rejected.
    pub blocked_patterns: Vec<String>,
}

impl Default for CommandPolicyConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: Vec::new(),
            blocked_patterns: default_blocked_patterns(),
        }
    }
}

/// Destructive commands that are never sent to the remote host.
pub fn default_blocked_patterns() -> Vec<String> {
    [
        "rm -rf /",
        "rm -rf /*",
        "mkfs",
        "dd if=/dev/zero",
        "dd if=/dev/random",
        ":(){ :|:& };:",
        "shutdown",
        "reboot",
        "halt",
        "poweroff",
        "init 0",
        "init 6",
        "> /dev/sda",
        "chmod -R 777 /",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// `[agent]`: tool-calling reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Capacity of the per-run streaming event channel.
    pub event_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            temperature: 0.3,
            max_tokens: 2000,
            event_buffer: 32,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server / Logging
// ─────────────────────────────────────────────────────────────────────────────

/// `[server]`: HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// `[logging]`: console filter and optional rolling JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the daily rolling JSON log; file logging is off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FaultlineConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());
        assert_eq!(config.llm().model, DEFAULT_LLM_MODEL);
        assert_eq!(config.embedding().dimensions, 1024);
        assert!(config.reranker().enabled);
        assert_eq!(config.reranker().top_n, 3);
        assert_eq!(config.vector_store().collection, "aiops_knowledge_v1");
        assert_eq!(config.remote().host, "192.168.30.18");
        assert_eq!(config.remote().exec_timeout(), Duration::from_secs(30));
        assert_eq!(config.agent().max_iterations, 5);
        assert_eq!(config.server().port, 8888);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = FaultlineConfig::from_toml(
            r#"
[llm]
model = "Qwen-32B"

[remote]
host = "10.0.0.5"

[remote.policy]
allowed_prefixes = ["systemctl status", "df"]
"#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.model, "Qwen-32B");
        assert_eq!(llm.max_tokens, 2000);
        assert!((llm.temperature - 0.7).abs() < f32::EPSILON);

        let remote = config.remote();
        assert_eq!(remote.host, "10.0.0.5");
        assert_eq!(remote.user, "root");
        assert_eq!(remote.policy.allowed_prefixes.len(), 2);
        // blocked patterns keep their defaults when only the allow-list is set
        assert!(remote.policy.blocked_patterns.iter().any(|p| p == "mkfs"));
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = FaultlineConfig::from_toml(
            r#"
[server]
port = 9000

[pipeline]
top_k = 5
"#,
        )
        .unwrap();
        let overlay = FaultlineConfig::from_toml(
            r#"
[server]
port = 7000
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.server().port, 7000);
        assert_eq!(base.pipeline().top_k, 5);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let err = FaultlineConfig::from_toml("[agent]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("agent.max_iterations"));
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let err = FaultlineConfig::from_toml("[reranker]\ntop_n = 0\n").unwrap_err();
        assert!(err.to_string().contains("reranker.top_n"));
    }

    #[test]
    fn test_reranker_can_be_disabled() {
        let config = FaultlineConfig::from_toml("[reranker]\nenabled = false\n").unwrap();
        assert!(!config.reranker().enabled);
    }
}
