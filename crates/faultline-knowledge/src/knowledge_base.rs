//! The loaded corpus and construction of its search tiers.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use faultline_config::{FaultlineConfig, Service, resolve_api_key};
use faultline_llm::SharedEmbedder;

use crate::error::Result;
use crate::index::{SearchTier, VectorIndex, VectorTier};
use crate::lexical::LexicalSearch;
use crate::local::LocalVectorStore;
use crate::milvus::{MilvusConfig, MilvusStore};
use crate::store::{StoredDocument, VectorStore};
use crate::types::IncidentCase;
use crate::corpus::load_corpus;

/// Corpus texts sent per embeddings request.
const EMBED_BATCH: usize = 32;

/// Which vector tiers to build in front of the lexical one.
#[derive(Clone, Default)]
pub struct IndexPlan {
    pub remote: Option<Arc<MilvusStore>>,
    /// Upsert the corpus into the remote collection before serving.
    pub sync_remote: bool,
    pub local: bool,
    pub dims: usize,
}

impl IndexPlan {
    pub fn from_config(config: &FaultlineConfig) -> Result<Self> {
        let store = config.vector_store();
        let remote = if store.enabled {
            let mut milvus =
                MilvusConfig::new(&store.url, &store.collection).with_timeout(store.timeout());
            if let Some(token) = resolve_api_key(Service::VectorStore, store.token.as_deref()) {
                milvus = milvus.with_token(token.value);
            }
            Some(Arc::new(MilvusStore::new(milvus)?))
        } else {
            None
        };

        Ok(Self {
            remote,
            sync_remote: store.sync_on_startup,
            local: config.knowledge().local_index,
            dims: config.embedding().dimensions,
        })
    }
}

/// The read-only incident corpus, shared by every request.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    cases: Arc<Vec<IncidentCase>>,
}

impl KnowledgeBase {
    pub fn new(cases: Vec<IncidentCase>) -> Self {
        Self {
            cases: Arc::new(cases),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(load_corpus(path)?))
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn cases(&self) -> &[IncidentCase] {
        &self.cases
    }

    pub fn documents(&self) -> Vec<StoredDocument> {
        self.cases
            .iter()
            .enumerate()
            .map(|(i, case)| StoredDocument::from_case(i, case))
            .collect()
    }

    pub fn lexical(&self) -> LexicalSearch {
        LexicalSearch::new(self.cases.clone())
    }

    /// Build the tier chain. Failures here only drop tiers; the lexical
    /// tier is always present.
    pub async fn build_index(&self, embedder: Option<SharedEmbedder>, plan: IndexPlan) -> VectorIndex {
        let Some(embedder) = embedder else {
            info!("No embedder configured, serving lexical search only");
            return VectorIndex::lexical_only(self.lexical());
        };

        let documents = self.documents();
        let needs_embeddings = plan.local || (plan.remote.is_some() && plan.sync_remote);
        let embeddings = if needs_embeddings && !documents.is_empty() {
            match self.embed_documents(&embedder, &documents).await {
                Ok(embeddings) => Some(embeddings),
                Err(e) => {
                    warn!(error = %e, "Failed to embed corpus, vector tiers limited");
                    None
                }
            }
        } else {
            Some(Vec::new())
        };

        let mut tiers: Vec<Arc<dyn SearchTier>> = Vec::new();

        if let Some(remote) = plan.remote {
            if plan.sync_remote {
                if let Some(ref embeddings) = embeddings {
                    if let Err(e) = sync_remote(&remote, &documents, embeddings, plan.dims).await {
                        warn!(collection = remote.collection(), error = %e, "Remote vector store sync failed");
                    }
                }
            }
            tiers.push(Arc::new(VectorTier::new(embedder.clone(), remote)));
        }

        if plan.local {
            match embeddings {
                Some(ref embeddings) => match build_local(&documents, embeddings, plan.dims).await {
                    Ok(local) => tiers.push(Arc::new(VectorTier::new(embedder.clone(), local))),
                    Err(e) => warn!(error = %e, "Failed to build local vector index"),
                },
                None => warn!("Skipping local vector index, corpus embeddings unavailable"),
            }
        }

        let index = VectorIndex::new(tiers, self.lexical());
        info!(tiers = ?index.tier_names(), cases = self.len(), "Knowledge index ready");
        index
    }

    async fn embed_documents(
        &self,
        embedder: &SharedEmbedder,
        documents: &[StoredDocument],
    ) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(EMBED_BATCH) {
            let texts: Vec<&str> = chunk.iter().map(|d| d.content.as_str()).collect();
            embeddings.extend(embedder.embed_batch(&texts).await?);
        }
        Ok(embeddings)
    }
}

async fn sync_remote(
    remote: &MilvusStore,
    documents: &[StoredDocument],
    embeddings: &[Vec<f32>],
    dims: usize,
) -> Result<()> {
    remote.ensure_collection(dims).await?;
    remote.upsert(documents, embeddings).await
}

async fn build_local(
    documents: &[StoredDocument],
    embeddings: &[Vec<f32>],
    dims: usize,
) -> Result<Arc<LocalVectorStore>> {
    let local = LocalVectorStore::open_in_memory(dims)?;
    match local.extension_version() {
        Ok(version) => debug!(sqlite_vec = %version, "Vector extension loaded"),
        Err(e) => warn!(error = %e, "Could not read vector extension version"),
    }
    local.upsert(documents, embeddings).await?;
    Ok(Arc::new(local))
}
