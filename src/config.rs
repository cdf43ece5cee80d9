use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{AnalyzeRequest, Granularity, SearchRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the vector store, corpus graph and analysis caches live
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Retrieval defaults and tuning knobs
    pub retrieval: RetrievalConfig,
    /// Optional JSON file with extra query-expansion terms
    pub expansion_terms_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for chat/reranking
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

/// Defaults applied to analysis and search requests, plus the heuristics
/// that bound cost (minimum unit length, rerank window, fallback size).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub granularity: Granularity,
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub use_reranking: bool,
    pub use_multilingual: bool,
    /// Units shorter than this (in characters) are not sent to retrieval.
    pub min_unit_chars: usize,
    /// How many below-threshold candidates are kept when nothing passes.
    pub fallback_cap: usize,
    /// How many leading candidates the reranker reorders.
    pub rerank_cap: usize,
    pub cache_ttl_hours: i64,
    pub graph_expansion: bool,
    pub max_related: usize,
    /// Minimum score for content-similar items during graph expansion.
    pub similar_threshold: f32,
    pub summaries: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            expansion_terms_path: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Paragraph,
            max_results: 10,
            similarity_threshold: 0.12,
            use_reranking: false,
            use_multilingual: true,
            min_unit_chars: 20,
            fallback_cap: 3,
            rerank_cap: 10,
            cache_ttl_hours: 24,
            graph_expansion: false,
            max_related: 5,
            similar_threshold: 0.7,
            summaries: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CORPUS_MATCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("CORPUS_MATCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(path) = std::env::var("EXPANSION_TERMS_PATH") {
            config.expansion_terms_path = Some(PathBuf::from(path));
        }

        let r = &mut config.retrieval;
        if let Ok(val) = std::env::var("CORPUS_MATCH_GRANULARITY") {
            if let Some(g) = Granularity::parse(&val) {
                r.granularity = g;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_MAX_RESULTS") {
            if let Ok(v) = val.parse() {
                r.max_results = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_SIMILARITY_THRESHOLD") {
            if let Ok(v) = val.parse::<f32>() {
                r.similarity_threshold = v.clamp(0.0, 1.0);
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_USE_RERANKING") {
            r.use_reranking = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_MIN_UNIT_CHARS") {
            if let Ok(v) = val.parse() {
                r.min_unit_chars = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_FALLBACK_CAP") {
            if let Ok(v) = val.parse() {
                r.fallback_cap = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_RERANK_CAP") {
            if let Ok(v) = val.parse::<usize>() {
                r.rerank_cap = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_CACHE_TTL_HOURS") {
            if let Ok(v) = val.parse() {
                r.cache_ttl_hours = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_MATCH_MAX_RELATED") {
            if let Ok(v) = val.parse() {
                r.max_related = v;
            }
        }

        config
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join("corpus_graph.json")
    }
}

/// Fully resolved options for one whole-document analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub granularity: Granularity,
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub use_reranking: bool,
    pub use_multilingual: bool,
}

impl AnalysisOptions {
    pub fn resolve(req: &AnalyzeRequest, defaults: &RetrievalConfig) -> Self {
        Self {
            granularity: req.granularity.unwrap_or(defaults.granularity),
            max_results: req.max_results.unwrap_or(defaults.max_results).max(1),
            similarity_threshold: req
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold)
                .clamp(0.0, 1.0),
            use_reranking: req.use_reranking.unwrap_or(defaults.use_reranking),
            use_multilingual: req.use_multilingual.unwrap_or(defaults.use_multilingual),
        }
    }
}

impl From<&RetrievalConfig> for AnalysisOptions {
    fn from(defaults: &RetrievalConfig) -> Self {
        Self {
            granularity: defaults.granularity,
            max_results: defaults.max_results,
            similarity_threshold: defaults.similarity_threshold,
            use_reranking: defaults.use_reranking,
            use_multilingual: defaults.use_multilingual,
        }
    }
}

/// Fully resolved options for one conversational query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub fallback_enabled: bool,
    pub use_reranking: bool,
    pub use_multilingual: bool,
    /// Allow several chunks of the same item in the result list.
    pub chunk_level: bool,
    pub graph_expansion: bool,
    pub max_related: usize,
    pub similar_threshold: f32,
    pub summaries: bool,
    pub item_ids: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn resolve(req: &SearchRequest, defaults: &RetrievalConfig) -> Self {
        Self {
            top_k: req.limit.unwrap_or(defaults.max_results).max(1),
            similarity_threshold: req
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold)
                .clamp(0.0, 1.0),
            fallback_enabled: true,
            use_reranking: req.use_reranking.unwrap_or(defaults.use_reranking),
            use_multilingual: req.use_multilingual.unwrap_or(defaults.use_multilingual),
            chunk_level: req.chunk_level,
            graph_expansion: req.graph_expansion.unwrap_or(defaults.graph_expansion),
            max_related: defaults.max_related,
            similar_threshold: defaults.similar_threshold,
            summaries: req.summaries.unwrap_or(defaults.summaries),
            item_ids: req.item_ids.clone(),
        }
    }
}

impl From<&RetrievalConfig> for QueryOptions {
    fn from(defaults: &RetrievalConfig) -> Self {
        Self {
            top_k: defaults.max_results,
            similarity_threshold: defaults.similarity_threshold,
            fallback_enabled: true,
            use_reranking: defaults.use_reranking,
            use_multilingual: defaults.use_multilingual,
            chunk_level: false,
            graph_expansion: defaults.graph_expansion,
            max_related: defaults.max_related,
            similar_threshold: defaults.similar_threshold,
            summaries: defaults.summaries,
            item_ids: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_request(text: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            scope: "thesis".to_string(),
            text: text.to_string(),
            granularity: None,
            max_results: None,
            similarity_threshold: None,
            use_reranking: None,
            use_multilingual: None,
        }
    }

    #[test]
    fn test_analysis_options_take_defaults() {
        let defaults = RetrievalConfig::default();
        let opts = AnalysisOptions::resolve(&analyze_request("x"), &defaults);
        assert_eq!(opts, AnalysisOptions::from(&defaults));
    }

    #[test]
    fn test_analysis_options_override_and_clamp() {
        let mut req = analyze_request("x");
        req.granularity = Some(Granularity::Sentence);
        req.max_results = Some(0);
        req.similarity_threshold = Some(1.7);
        let opts = AnalysisOptions::resolve(&req, &RetrievalConfig::default());
        assert_eq!(opts.granularity, Granularity::Sentence);
        assert_eq!(opts.max_results, 1);
        assert_eq!(opts.similarity_threshold, 1.0);
    }

    #[test]
    fn test_query_options_keep_fallback_on() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"bloom","limit":3}"#).unwrap();
        let opts = QueryOptions::resolve(&req, &RetrievalConfig::default());
        assert_eq!(opts.top_k, 3);
        assert!(opts.fallback_enabled);
        assert!(!opts.chunk_level);
    }
}
