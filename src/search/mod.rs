pub mod expand;
pub mod fusion;
pub mod retrieval;
pub mod vector;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chunk returned by a nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub item_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub content: String,
    pub page_number: Option<u32>,
    pub external_key: Option<String>,
    /// Cosine similarity, clamped to [0, 1].
    pub similarity: f32,
}

/// Aggregate size of the indexed corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub items: usize,
    pub chunks: usize,
}

/// Nearest-neighbour search over indexed corpus chunks.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Up to `top_k` hits, best first. `filter` restricts to those item ids.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&[String]>,
    ) -> Result<Vec<VectorHit>>;

    async fn corpus_stats(&self) -> Result<CorpusStats>;
}
