use anyhow::Context;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::analysis::DocumentAnalyzer;
use crate::cache::CacheManager;
use crate::config::{Config, LlmConfig};
use crate::graph::{CitationGraphProvider, DocumentCatalog, JsonCorpusGraph};
use crate::llm::completion::HttpCompletion;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::rerank::Reranker;
use crate::llm::{CompletionProvider, EmbeddingProvider};
use crate::query::QueryService;
use crate::search::expand::QueryExpander;
use crate::search::retrieval::Retriever;
use crate::search::vector::VectorStore;
use crate::search::VectorSearchProvider;

/// Shared application state. Every service is built here once and handed
/// its collaborators explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub llm_config: Arc<RwLock<LlmConfig>>,
    pub analyzer: Arc<DocumentAnalyzer>,
    pub query: Arc<QueryService>,
    /// One whole-document analysis at a time.
    pub analysis_permit: Arc<tokio::sync::Semaphore>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

/// External services the engine depends on.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorSearchProvider>,
    pub completion: Arc<dyn CompletionProvider>,
    pub graph: Arc<dyn CitationGraphProvider>,
    pub catalog: Arc<dyn DocumentCatalog>,
}

impl AppState {
    /// Wire the HTTP LLM clients, the on-disk vector store and corpus graph.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.cache_dir())?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        let llm_config = Arc::new(RwLock::new(config.llm.clone()));

        let vectors = VectorStore::open_or_create(&config.vector_dir())?;
        tracing::info!("Vector store: {} chunks", vectors.entry_count());
        let graph = Arc::new(JsonCorpusGraph::open(&config.graph_path())?);

        let collaborators = Collaborators {
            embedder: Arc::new(HttpEmbedder::new(http_client.clone(), llm_config.clone())),
            index: Arc::new(vectors),
            completion: Arc::new(HttpCompletion::new(http_client.clone(), llm_config.clone())),
            graph: graph.clone(),
            catalog: graph,
        };

        Self::with_collaborators(config, http_client, llm_config, collaborators)
    }

    pub fn with_collaborators(
        config: Config,
        http_client: reqwest::Client,
        llm_config: Arc<RwLock<LlmConfig>>,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let expander = match &config.expansion_terms_path {
            Some(path) => QueryExpander::with_terms_file(path)
                .context("Failed to load EXPANSION_TERMS_PATH")?,
            None => QueryExpander::builtin()?,
        };
        let expander = Arc::new(expander);

        let tuning = &config.retrieval;
        let retriever = Arc::new(Retriever::new(collaborators.embedder, collaborators.index));
        let reranker = Arc::new(Reranker::new(collaborators.completion, tuning.rerank_cap));
        let cache = Arc::new(CacheManager::new(config.cache_dir(), tuning.cache_ttl_hours));

        let analyzer = Arc::new(DocumentAnalyzer::new(
            retriever.clone(),
            reranker.clone(),
            expander.clone(),
            cache,
            tuning,
        ));
        let query = Arc::new(QueryService::new(
            retriever,
            reranker,
            expander,
            collaborators.graph,
            collaborators.catalog,
            tuning.fallback_cap,
        ));

        Ok(Self {
            config,
            http_client,
            llm_config,
            analyzer,
            query,
            analysis_permit: Arc::new(tokio::sync::Semaphore::new(1)),
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
        })
    }
}
