//! Citation graph and document catalog collaborators, plus a JSON-file
//! implementation of both.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Citation and content-similarity neighbours of corpus items.
#[async_trait]
pub trait CitationGraphProvider: Send + Sync {
    /// Items that cite `item_id`.
    async fn cited_by(&self, item_id: &str) -> Result<Vec<String>>;
    /// Items cited by `item_id`.
    async fn citing(&self, item_id: &str) -> Result<Vec<String>>;
    /// Content-similar items scoring at least `threshold`, best first.
    async fn similar_to(&self, item_id: &str, threshold: f32, limit: usize) -> Result<Vec<String>>;
}

/// Bibliographic metadata of one corpus item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Whole-document summary, when one has been generated.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub external_key: Option<String>,
}

#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    async fn document(&self, item_id: &str) -> Result<Option<CatalogEntry>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationEdge {
    /// The citing item.
    pub from: String,
    /// The cited item.
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarItem {
    pub item_id: String,
    pub score: f32,
}

/// On-disk layout of `corpus_graph.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusGraphFile {
    #[serde(default)]
    pub citations: Vec<CitationEdge>,
    #[serde(default)]
    pub similar: HashMap<String, Vec<SimilarItem>>,
    #[serde(default)]
    pub documents: Vec<CatalogEntry>,
}

/// Citation graph and catalog loaded once from a JSON file.
#[derive(Debug, Default)]
pub struct JsonCorpusGraph {
    cited_by: HashMap<String, Vec<String>>,
    citing: HashMap<String, Vec<String>>,
    similar: HashMap<String, Vec<SimilarItem>>,
    documents: HashMap<String, CatalogEntry>,
}

impl JsonCorpusGraph {
    /// Load from `path`; a missing file yields an empty graph.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No corpus graph at {}, graph expansion disabled", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus graph {}", path.display()))?;
        let file: CorpusGraphFile = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse corpus graph {}", path.display()))?;
        let graph = Self::from_file(file);
        tracing::info!(
            "Loaded corpus graph: {} documents, {} citing items",
            graph.documents.len(),
            graph.citing.len()
        );
        Ok(graph)
    }

    pub fn from_file(file: CorpusGraphFile) -> Self {
        let mut cited_by: HashMap<String, Vec<String>> = HashMap::new();
        let mut citing: HashMap<String, Vec<String>> = HashMap::new();
        for edge in file.citations {
            push_unique(cited_by.entry(edge.to.clone()).or_default(), &edge.from);
            push_unique(citing.entry(edge.from).or_default(), &edge.to);
        }

        let mut similar = file.similar;
        for list in similar.values_mut() {
            list.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }

        Self {
            cited_by,
            citing,
            similar,
            documents: file
                .documents
                .into_iter()
                .map(|d| (d.item_id.clone(), d))
                .collect(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

#[async_trait]
impl CitationGraphProvider for JsonCorpusGraph {
    async fn cited_by(&self, item_id: &str) -> Result<Vec<String>> {
        Ok(self.cited_by.get(item_id).cloned().unwrap_or_default())
    }

    async fn citing(&self, item_id: &str) -> Result<Vec<String>> {
        Ok(self.citing.get(item_id).cloned().unwrap_or_default())
    }

    async fn similar_to(&self, item_id: &str, threshold: f32, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .similar
            .get(item_id)
            .map(|list| {
                list.iter()
                    .filter(|s| s.score >= threshold && s.item_id != item_id)
                    .take(limit)
                    .map(|s| s.item_id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentCatalog for JsonCorpusGraph {
    async fn document(&self, item_id: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.documents.get(item_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH_JSON: &str = r#"{
        "citations": [
            {"from": "A", "to": "B"},
            {"from": "C", "to": "B"},
            {"from": "A", "to": "B"}
        ],
        "similar": {
            "B": [
                {"item_id": "D", "score": 0.65},
                {"item_id": "E", "score": 0.9},
                {"item_id": "F", "score": 0.75}
            ]
        },
        "documents": [
            {"item_id": "B", "title": "Cited work", "summary": "A summary."}
        ]
    }"#;

    fn graph() -> JsonCorpusGraph {
        JsonCorpusGraph::from_file(serde_json::from_str(GRAPH_JSON).unwrap())
    }

    #[tokio::test]
    async fn test_citation_edges_both_directions() {
        let g = graph();
        assert_eq!(g.cited_by("B").await.unwrap(), vec!["A", "C"]);
        assert_eq!(g.citing("A").await.unwrap(), vec!["B"]);
        assert!(g.citing("B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_respects_threshold_and_limit() {
        let g = graph();
        assert_eq!(g.similar_to("B", 0.7, 5).await.unwrap(), vec!["E", "F"]);
        assert_eq!(g.similar_to("B", 0.7, 1).await.unwrap(), vec!["E"]);
        assert!(g.similar_to("Z", 0.0, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let g = graph();
        let entry = g.document("B").await.unwrap().unwrap();
        assert_eq!(entry.summary.as_deref(), Some("A summary."));
        assert!(entry.authors.is_empty());
        assert!(g.document("A").await.unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let g = JsonCorpusGraph::open(&dir.path().join("corpus_graph.json")).unwrap();
        assert!(g.documents.is_empty());
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("corpus_graph.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(JsonCorpusGraph::open(&path).is_err());
    }
}
