//! Whole-document analysis: segment, retrieve per unit, cache the full map.
//!
//! Units are processed strictly one after another. Cancellation is checked
//! between units, so a run stops after the collaborator call in flight.

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::cache::{AnalysisCache, CacheKey, CacheManager, CacheOptions};
use crate::cancel::CancellationToken;
use crate::config::{AnalysisOptions, RetrievalConfig};
use crate::error::AnalysisError;
use crate::fingerprint::{corpus_state_hash, sha256_hex};
use crate::llm::rerank::Reranker;
use crate::models::{AnalysisProgress, AnalysisState, TextUnit, UnitResult};
use crate::search::expand::QueryExpander;
use crate::search::retrieval::{RetrievalOptions, RetrievalOutcome, Retriever};
use crate::segment::context::{contextual_query, DocumentOutline};
use crate::segment::segment;

/// Characters of unit content used as a progress label when it has no title.
const LABEL_CHARS: usize = 60;

/// One analysis run with its options already resolved.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub scope: String,
    pub text: String,
    pub options: AnalysisOptions,
}

pub struct DocumentAnalyzer {
    retriever: Arc<Retriever>,
    reranker: Arc<Reranker>,
    expander: Arc<QueryExpander>,
    cache: Arc<CacheManager>,
    min_unit_chars: usize,
    fallback_cap: usize,
    state: Mutex<AnalysisState>,
    active: Mutex<Option<CancellationToken>>,
}

impl DocumentAnalyzer {
    pub fn new(
        retriever: Arc<Retriever>,
        reranker: Arc<Reranker>,
        expander: Arc<QueryExpander>,
        cache: Arc<CacheManager>,
        tuning: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            reranker,
            expander,
            cache,
            min_unit_chars: tuning.min_unit_chars,
            fallback_cap: tuning.fallback_cap,
            state: Mutex::new(AnalysisState::Idle),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AnalysisState {
        *self.state.lock()
    }

    /// Cancel the active run, if any. Returns whether there was one.
    pub fn cancel_analysis(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn analyze_document<F>(
        &self,
        request: &AnalysisRequest,
        cancel: CancellationToken,
        mut on_progress: F,
    ) -> Result<Vec<UnitResult>, AnalysisError>
    where
        F: FnMut(AnalysisProgress) + Send,
    {
        *self.active.lock() = Some(cancel.clone());
        self.set_state(AnalysisState::Running);

        let outcome = self.run(request, &cancel, &mut on_progress).await;

        self.active.lock().take();
        self.set_state(match &outcome {
            Ok(_) => AnalysisState::Done,
            Err(AnalysisError::Cancelled) => AnalysisState::Cancelled,
            Err(AnalysisError::CollaboratorUnavailable(_)) => AnalysisState::Failed,
        });
        outcome
    }

    async fn run<F>(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<Vec<UnitResult>, AnalysisError>
    where
        F: FnMut(AnalysisProgress) + Send,
    {
        let stats = self
            .retriever
            .index()
            .corpus_stats()
            .await
            .map_err(AnalysisError::CollaboratorUnavailable)?;

        let key = CacheKey {
            document_hash: sha256_hex(&request.text),
            corpus_state_hash: corpus_state_hash(stats.items, stats.chunks),
            options: CacheOptions::from(&request.options),
        };

        if let Some(cached) = self.cache.load(&request.scope, &key) {
            tracing::info!(
                "Cache hit for scope {} ({} units)",
                request.scope,
                cached.unit_order.len()
            );
            return Ok(cached.ordered_results());
        }

        let outline = DocumentOutline::build(&request.text);
        let units: Vec<TextUnit> = segment(&request.text, request.options.granularity)
            .into_iter()
            .filter(|u| u.content.chars().count() >= self.min_unit_chars)
            .collect();

        if units.is_empty() {
            tracing::info!("No units long enough to analyze in scope {}", request.scope);
            return Ok(Vec::new());
        }

        let total = units.len();
        tracing::info!(
            "Analyzing {total} {:?} units for scope {}",
            request.options.granularity,
            request.scope
        );

        let mut results = Vec::with_capacity(total);
        for (i, unit) in units.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Analysis of scope {} cancelled at unit {i}/{total}", request.scope);
                return Err(AnalysisError::Cancelled);
            }

            let outcome = match self.analyze_unit(&outline, &unit, &request.options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Unit {} failed, recording no recommendations: {e:#}", unit.id);
                    RetrievalOutcome::default()
                }
            };

            on_progress(AnalysisProgress::new(i + 1, total, progress_label(&unit)));
            results.push(UnitResult {
                unit_id: unit.id.clone(),
                unit,
                recommendations: outcome.recommendations,
                fallback_applied: outcome.fallback_applied,
                analyzed_at: Utc::now(),
            });
        }

        self.cache
            .save(&request.scope, &AnalysisCache::new(key, &results));
        Ok(results)
    }

    async fn analyze_unit(
        &self,
        outline: &DocumentOutline,
        unit: &TextUnit,
        options: &AnalysisOptions,
    ) -> Result<RetrievalOutcome> {
        let query = contextual_query(&outline.context_for(unit), &unit.content);
        let variants = if options.use_multilingual {
            self.expander.expand(&query)
        } else {
            vec![query.clone()]
        };

        let retrieval = RetrievalOptions {
            top_k: options.max_results,
            similarity_threshold: options.similarity_threshold,
            fallback_enabled: true,
            fallback_cap: self.fallback_cap,
            rerank_follows: options.use_reranking,
            one_per_item: true,
            item_ids: None,
        };
        let mut outcome = self.retriever.search(&variants, &retrieval).await?;
        tracing::debug!(
            "Unit {} ({} variants): {} recommendations",
            unit.id,
            variants.len(),
            outcome.recommendations.len()
        );

        if options.use_reranking {
            let candidates = std::mem::take(&mut outcome.recommendations);
            outcome.recommendations = self.reranker.rerank(&query, candidates).await?;
        }
        Ok(outcome)
    }

    /// Cached result of one unit, from the scope's last finished run.
    pub fn results_for_unit(&self, scope: &str, unit_id: &str) -> Option<UnitResult> {
        self.cache.peek(scope)?.units.remove(unit_id)
    }

    /// All cached unit results of the scope, in document order.
    pub fn all_cached_results(&self, scope: &str) -> Vec<UnitResult> {
        self.cache
            .peek(scope)
            .map(|c| c.ordered_results())
            .unwrap_or_default()
    }

    pub fn clear_cache(&self, scope: &str) -> bool {
        self.cache.clear(scope)
    }

    fn set_state(&self, state: AnalysisState) {
        *self.state.lock() = state;
    }
}

fn progress_label(unit: &TextUnit) -> String {
    if let Some(title) = &unit.title {
        return title.clone();
    }
    let flat = unit.content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(LABEL_CHARS) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}
