//! Conversational search: one free-form query, no segmentation.
//!
//! Errors propagate. Deciding what to do when retrieval is down (e.g.
//! answering without context) is left to the caller.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::QueryOptions;
use crate::graph::{CitationGraphProvider, DocumentCatalog};
use crate::llm::rerank::Reranker;
use crate::models::{Origin, Recommendation};
use crate::search::expand::QueryExpander;
use crate::search::retrieval::{RetrievalOptions, Retriever};

/// Similarity reported for graph-expanded items. They were never scored
/// against the query, so this only marks them as distinct from retrieval.
pub const RELATED_SIMILARITY: f32 = 0.5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub recommendations: Vec<Recommendation>,
    pub related: Vec<Recommendation>,
    pub fallback_applied: bool,
}

pub struct QueryService {
    retriever: Arc<Retriever>,
    reranker: Arc<Reranker>,
    expander: Arc<QueryExpander>,
    graph: Arc<dyn CitationGraphProvider>,
    catalog: Arc<dyn DocumentCatalog>,
    fallback_cap: usize,
}

impl QueryService {
    pub fn new(
        retriever: Arc<Retriever>,
        reranker: Arc<Reranker>,
        expander: Arc<QueryExpander>,
        graph: Arc<dyn CitationGraphProvider>,
        catalog: Arc<dyn DocumentCatalog>,
        fallback_cap: usize,
    ) -> Self {
        Self {
            retriever,
            reranker,
            expander,
            graph,
            catalog,
            fallback_cap,
        }
    }

    pub async fn search(&self, query: &str, options: &QueryOptions) -> Result<QueryResult> {
        let variants = if options.use_multilingual {
            self.expander.expand(query)
        } else {
            vec![query.to_string()]
        };

        let retrieval = RetrievalOptions {
            top_k: options.top_k,
            similarity_threshold: options.similarity_threshold,
            fallback_enabled: options.fallback_enabled,
            fallback_cap: self.fallback_cap,
            rerank_follows: options.use_reranking,
            one_per_item: !options.chunk_level,
            item_ids: options.item_ids.clone(),
        };
        let outcome = self.retriever.search(&variants, &retrieval).await?;

        let mut recommendations = if options.use_reranking {
            self.reranker
                .rerank(query, outcome.recommendations)
                .await
                .context("Reranking failed")?
        } else {
            outcome.recommendations
        };

        let related = if options.graph_expansion && options.max_related > 0 {
            self.related_items(&recommendations, options).await?
        } else {
            Vec::new()
        };

        if options.summaries {
            recommendations = self.substitute_summaries(recommendations).await?;
        }

        tracing::debug!(
            "Query returned {} results, {} related (fallback: {})",
            recommendations.len(),
            related.len(),
            outcome.fallback_applied
        );
        Ok(QueryResult {
            recommendations,
            related,
            fallback_applied: outcome.fallback_applied,
        })
    }

    /// Neighbours of the result items in the citation graph, in result rank
    /// order, excluding items already present. Ids the catalog does not know
    /// are skipped and do not count against `max_related`.
    async fn related_items(
        &self,
        results: &[Recommendation],
        options: &QueryOptions,
    ) -> Result<Vec<Recommendation>> {
        let mut seen: HashSet<String> = results.iter().map(|r| r.item_id.clone()).collect();
        let mut sources: Vec<&str> = Vec::new();
        for r in results {
            if !sources.contains(&r.item_id.as_str()) {
                sources.push(&r.item_id);
            }
        }

        let mut related = Vec::new();
        for source in sources {
            let mut neighbours = self.graph.cited_by(source).await?;
            neighbours.extend(self.graph.citing(source).await?);
            neighbours.extend(
                self.graph
                    .similar_to(source, options.similar_threshold, options.max_related)
                    .await?,
            );

            for id in neighbours {
                if related.len() >= options.max_related {
                    return Ok(related);
                }
                if !seen.insert(id.clone()) {
                    continue;
                }
                let Some(entry) = self.catalog.document(&id).await? else {
                    tracing::debug!("Related item {id} not in catalog, skipping");
                    continue;
                };
                related.push(Recommendation {
                    chunk_id: entry.item_id.clone(),
                    item_id: entry.item_id,
                    title: entry.title,
                    authors: entry.authors,
                    similarity: RELATED_SIMILARITY,
                    preview: entry.summary.unwrap_or_default(),
                    external_key: entry.external_key,
                    page_number: None,
                    origin: Origin::Related,
                });
            }
        }
        Ok(related)
    }

    /// One entry per item, previews replaced by the catalog summary when
    /// there is one.
    async fn substitute_summaries(
        &self,
        results: Vec<Recommendation>,
    ) -> Result<Vec<Recommendation>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(results.len());
        for mut r in results {
            if !seen.insert(r.item_id.clone()) {
                continue;
            }
            if let Some(summary) = self
                .catalog
                .document(&r.item_id)
                .await?
                .and_then(|entry| entry.summary)
            {
                r.preview = summary;
                r.page_number = None;
            }
            out.push(r);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CorpusGraphFile, JsonCorpusGraph};
    use crate::llm::{CompletionProvider, EmbeddingProvider};
    use crate::search::{CorpusStats, VectorHit, VectorSearchProvider};
    use async_trait::async_trait;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
    }

    struct StaticIndex(Vec<VectorHit>);

    #[async_trait]
    impl VectorSearchProvider for StaticIndex {
        async fn search(
            &self,
            _vector: &[f32],
            top_k: usize,
            filter: Option<&[String]>,
        ) -> Result<Vec<VectorHit>> {
            Ok(self
                .0
                .iter()
                .filter(|h| filter.map_or(true, |ids| ids.contains(&h.item_id)))
                .take(top_k)
                .cloned()
                .collect())
        }

        async fn corpus_stats(&self) -> Result<CorpusStats> {
            Ok(CorpusStats::default())
        }
    }

    struct ReverseCompletion;

    #[async_trait]
    impl CompletionProvider for ReverseCompletion {
        async fn complete(&self, _prompt: &str, _context_items: &[String]) -> Result<String> {
            Ok("3, 2, 1".to_string())
        }
    }

    fn hit(chunk_id: &str, item_id: &str, similarity: f32) -> VectorHit {
        VectorHit {
            chunk_id: chunk_id.to_string(),
            item_id: item_id.to_string(),
            title: format!("Title {item_id}"),
            authors: vec![],
            content: format!("excerpt {chunk_id}"),
            page_number: Some(7),
            external_key: None,
            similarity,
        }
    }

    fn service_with(embedder: Arc<dyn EmbeddingProvider>) -> QueryService {
        let index = StaticIndex(vec![
            hit("A#0", "A", 0.9),
            hit("A#1", "A", 0.8),
            hit("B#0", "B", 0.7),
        ]);
        let graph_file: CorpusGraphFile = serde_json::from_str(
            r#"{
                "citations": [
                    {"from": "X", "to": "A"},
                    {"from": "A", "to": "B"},
                    {"from": "B", "to": "Y"},
                    {"from": "B", "to": "Unknown"}
                ],
                "similar": {"A": [{"item_id": "Z", "score": 0.8}]},
                "documents": [
                    {"item_id": "A", "title": "Title A", "summary": "Summary of A."},
                    {"item_id": "X", "title": "Citer X", "summary": "X cites A."},
                    {"item_id": "Y", "title": "Cited Y"},
                    {"item_id": "Z", "title": "Similar Z"}
                ]
            }"#,
        )
        .unwrap();
        let graph = Arc::new(JsonCorpusGraph::from_file(graph_file));
        QueryService::new(
            Arc::new(Retriever::new(embedder, Arc::new(index))),
            Arc::new(Reranker::new(Arc::new(ReverseCompletion), 10)),
            Arc::new(QueryExpander::new(vec![]).unwrap()),
            graph.clone(),
            graph,
            3,
        )
    }

    fn options() -> QueryOptions {
        QueryOptions {
            top_k: 10,
            similarity_threshold: 0.12,
            fallback_enabled: true,
            use_reranking: false,
            use_multilingual: false,
            chunk_level: false,
            graph_expansion: false,
            max_related: 5,
            similar_threshold: 0.7,
            summaries: false,
            item_ids: None,
        }
    }

    fn ids(list: &[Recommendation]) -> Vec<&str> {
        list.iter().map(|r| r.item_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_one_result_per_item_by_default() {
        let result = service_with(Arc::new(UnitEmbedder))
            .search("q", &options())
            .await
            .unwrap();
        assert_eq!(ids(&result.recommendations), vec!["A", "B"]);
        assert!(result.related.is_empty());
        assert!(!result.fallback_applied);
    }

    #[tokio::test]
    async fn test_chunk_level_keeps_every_chunk() {
        let opts = QueryOptions {
            chunk_level: true,
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        assert_eq!(ids(&result.recommendations), vec!["A", "A", "B"]);
    }

    #[tokio::test]
    async fn test_graph_expansion() {
        let opts = QueryOptions {
            graph_expansion: true,
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        // A: cited by X, similar to Z (B is already a result). B: cites Y, Unknown is skipped.
        assert_eq!(ids(&result.related), vec!["X", "Z", "Y"]);
        assert!(result
            .related
            .iter()
            .all(|r| r.origin == Origin::Related && r.similarity == RELATED_SIMILARITY));
        assert_eq!(result.related[0].preview, "X cites A.");
    }

    #[tokio::test]
    async fn test_graph_expansion_capped() {
        let opts = QueryOptions {
            graph_expansion: true,
            max_related: 1,
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        assert_eq!(ids(&result.related), vec!["X"]);
    }

    #[tokio::test]
    async fn test_summary_substitution() {
        let opts = QueryOptions {
            chunk_level: true,
            summaries: true,
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        assert_eq!(ids(&result.recommendations), vec!["A", "B"]);
        assert_eq!(result.recommendations[0].preview, "Summary of A.");
        assert_eq!(result.recommendations[1].preview, "excerpt B#0");
    }

    #[tokio::test]
    async fn test_reranking_applied() {
        let opts = QueryOptions {
            chunk_level: true,
            use_reranking: true,
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        let chunks: Vec<&str> = result.recommendations.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(chunks, vec!["B#0", "A#1", "A#0"]);
    }

    #[tokio::test]
    async fn test_item_filter_forwarded() {
        let opts = QueryOptions {
            item_ids: Some(vec!["B".to_string()]),
            ..options()
        };
        let result = service_with(Arc::new(UnitEmbedder)).search("q", &opts).await.unwrap();
        assert_eq!(ids(&result.recommendations), vec!["B"]);
    }

    #[tokio::test]
    async fn test_retrieval_failure_propagates() {
        let result = service_with(Arc::new(DownEmbedder)).search("q", &options()).await;
        assert!(result.is_err());
    }
}
