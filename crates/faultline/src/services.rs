//! Building the runtime services from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use faultline_agent::{DiagnosisPipeline, PipelineOptions, RemoteExecutionTool, ToolCallingAgent};
use faultline_config::{FaultlineConfig, Service, resolve_api_key};
use faultline_knowledge::{IndexPlan, KnowledgeBase, KnowledgeError, Reranker};
use faultline_llm::{
    HttpReranker, HttpRerankerConfig, OpenAiBackend, OpenAiConfig, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedBackend, SharedEmbedder,
};

/// Resolve a credential, warning when none is configured.
fn api_key(service: Service, config_value: Option<&str>) -> Option<String> {
    match resolve_api_key(service, config_value) {
        Some(secret) => {
            tracing::debug!(service = service.display_name(), source = %secret.source, "Credential resolved");
            Some(secret.value)
        }
        None => {
            warn!(
                service = service.display_name(),
                env_var = service.env_var(),
                "No credential configured"
            );
            None
        }
    }
}

pub fn llm_backend(config: &FaultlineConfig) -> Result<OpenAiBackend> {
    let llm = config.llm();
    let mut backend_config = OpenAiConfig::new(&llm.base_url, &llm.model)
        .with_name("llm")
        .with_timeout(llm.timeout())
        .with_max_retries(llm.max_retries);
    if let Some(key) = api_key(Service::Llm, llm.api_key.as_deref()) {
        backend_config = backend_config.with_api_key(key);
    }
    OpenAiBackend::new(backend_config).context("failed to create LLM client")
}

pub fn embedder(config: &FaultlineConfig) -> Result<OpenAiEmbedder> {
    let embedding = config.embedding();
    let mut embedder_config =
        OpenAiEmbedderConfig::new(&embedding.base_url, &embedding.model, embedding.dimensions)
            .with_timeout(embedding.timeout());
    if let Some(key) = api_key(Service::Embedding, embedding.api_key.as_deref()) {
        embedder_config = embedder_config.with_api_key(key);
    }
    OpenAiEmbedder::new(embedder_config).context("failed to create embedding client")
}

pub fn rerank_service(config: &FaultlineConfig) -> Result<HttpReranker> {
    let reranker = config.reranker();
    let mut reranker_config =
        HttpRerankerConfig::new(&reranker.base_url, &reranker.model).with_timeout(reranker.timeout());
    if let Some(key) = api_key(Service::Reranker, reranker.api_key.as_deref()) {
        reranker_config = reranker_config.with_api_key(key);
    }
    HttpReranker::new(reranker_config).context("failed to create rerank client")
}

/// Load the corpus. A missing file yields an empty knowledge base.
pub fn knowledge(config: &FaultlineConfig) -> Result<KnowledgeBase> {
    let path = config.knowledge().corpus_path;
    match KnowledgeBase::load(&path) {
        Ok(kb) => {
            info!(path = %path.display(), cases = kb.len(), "Knowledge corpus loaded");
            Ok(kb)
        }
        Err(KnowledgeError::CorpusNotFound(path)) => {
            warn!(path = %path.display(), "Knowledge corpus not found, starting with no cases");
            Ok(KnowledgeBase::default())
        }
        Err(e) => Err(e).context("failed to load knowledge corpus"),
    }
}

/// Corpus plus the retrieval-augmented pipeline over it.
pub async fn pipeline(config: &FaultlineConfig) -> Result<(KnowledgeBase, DiagnosisPipeline)> {
    let kb = knowledge(config)?;

    let embedder: SharedEmbedder = Arc::new(embedder(config)?);
    let plan = IndexPlan::from_config(config).context("failed to configure vector store")?;
    let index = kb.build_index(Some(embedder), plan).await;
    info!(tiers = ?index.tier_names(), "Search tiers ready");

    let reranker_config = config.reranker();
    let reranker = if reranker_config.enabled {
        Reranker::new(Arc::new(rerank_service(config)?), reranker_config.top_n)
    } else {
        Reranker::disabled(reranker_config.top_n)
    };

    let backend: SharedBackend = Arc::new(llm_backend(config)?);
    let pipeline = DiagnosisPipeline::new(
        Arc::new(index),
        reranker,
        backend,
        PipelineOptions::from_config(config),
    );
    Ok((kb, pipeline))
}

/// The tool-calling agent against the configured remote host.
pub fn agent(config: &FaultlineConfig) -> Result<ToolCallingAgent> {
    let remote = config.remote();
    info!(host = %remote.host, user = %remote.user, "Remote execution target");

    let backend: SharedBackend = Arc::new(llm_backend(config)?);
    Ok(ToolCallingAgent::new(
        backend,
        Arc::new(RemoteExecutionTool::from_config(&remote)),
        config.agent(),
    ))
}
