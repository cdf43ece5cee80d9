use anyhow::{Context, Result};
use std::sync::Arc;

use super::fusion::{best_per_item, max_fusion};
use super::{VectorHit, VectorSearchProvider};
use crate::llm::EmbeddingProvider;
use crate::models::{Origin, Recommendation};

/// Characters of chunk content kept as a recommendation preview.
const PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub fallback_enabled: bool,
    /// Below-threshold candidates kept when nothing passes.
    pub fallback_cap: usize,
    /// Widens the candidate pool so a reranker has more to choose from.
    pub rerank_follows: bool,
    /// At most one recommendation per corpus item.
    pub one_per_item: bool,
    pub item_ids: Option<Vec<String>>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_threshold: 0.12,
            fallback_enabled: true,
            fallback_cap: 3,
            rerank_follows: false,
            one_per_item: true,
            item_ids: None,
        }
    }
}

impl RetrievalOptions {
    /// Candidates requested from the index per variant.
    pub fn candidate_pool(&self) -> usize {
        let multiplier = if self.rerank_follows { 3 } else { 2 };
        self.top_k.max(1) * multiplier
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub recommendations: Vec<Recommendation>,
    /// Every candidate fell below the threshold and the best few were kept anyway.
    pub fallback_applied: bool,
    /// Candidates left after fusion, dedup and truncation, before thresholding.
    pub candidate_count: usize,
}

/// Embedding search over several query variants with max fusion,
/// thresholding and a fallback for all-below-threshold results.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearchProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorSearchProvider>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &Arc<dyn VectorSearchProvider> {
        &self.index
    }

    pub async fn search(
        &self,
        variants: &[String],
        options: &RetrievalOptions,
    ) -> Result<RetrievalOutcome> {
        let pool = options.candidate_pool();
        let mut per_variant = Vec::with_capacity(variants.len());

        for variant in variants {
            let vector = self
                .embedder
                .embed(variant)
                .await
                .context("Failed to embed query")?;
            let hits = self
                .index
                .search(&vector, pool, options.item_ids.as_deref())
                .await
                .context("Vector search failed")?;
            per_variant.push(hits);
        }

        let fused = max_fusion(per_variant);
        tracing::debug!(
            "Fused {} variants into {} candidates",
            variants.len(),
            fused.len()
        );
        Ok(apply_threshold(fused, options))
    }
}

/// Dedup, truncate, threshold, fallback. `fused` must be sorted best first.
pub fn apply_threshold(fused: Vec<VectorHit>, options: &RetrievalOptions) -> RetrievalOutcome {
    let mut candidates = if options.one_per_item {
        best_per_item(fused)
    } else {
        fused
    };
    candidates.truncate(options.top_k);
    let candidate_count = candidates.len();

    let passing: Vec<VectorHit> = candidates
        .iter()
        .filter(|h| h.similarity >= options.similarity_threshold)
        .cloned()
        .collect();

    let (kept, fallback_applied) =
        if passing.is_empty() && candidate_count > 0 && options.fallback_enabled {
            let n = options.fallback_cap.min(candidate_count);
            tracing::info!(
                "No candidate reached threshold {:.3}, keeping top {n} of {candidate_count}",
                options.similarity_threshold
            );
            candidates.truncate(n);
            (candidates, true)
        } else {
            (passing, false)
        };

    RetrievalOutcome {
        recommendations: kept.into_iter().map(to_recommendation).collect(),
        fallback_applied,
        candidate_count,
    }
}

fn to_recommendation(hit: VectorHit) -> Recommendation {
    Recommendation {
        preview: preview_of(&hit.content),
        item_id: hit.item_id,
        chunk_id: hit.chunk_id,
        title: hit.title,
        authors: hit.authors,
        similarity: hit.similarity.clamp(0.0, 1.0),
        external_key: hit.external_key,
        page_number: hit.page_number,
        origin: Origin::Retrieved,
    }
}

fn preview_of(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}
