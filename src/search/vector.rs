use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{CorpusStats, VectorHit, VectorSearchProvider};

/// A chunk of a corpus item together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub external_key: Option<String>,
    pub embedding: Vec<f32>,
}

/// In-memory vector store with disk persistence and cosine similarity search.
pub struct VectorStore {
    entries: RwLock<Vec<IndexedChunk>>,
    persist_path: PathBuf,
}

impl VectorStore {
    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)
            .with_context(|| format!("Failed to create {}", vector_dir.display()))?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read vector store")?;
            match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "Vector store at {} is unreadable, starting empty: {e}",
                        persist_path.display()
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Insert or replace chunks (keyed by `chunk_id`) and persist.
    pub fn add_chunks(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let mut entries = self.entries.write();
        let incoming: HashSet<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        entries.retain(|e| !incoming.contains(e.chunk_id.as_str()));
        entries.extend(chunks);
        self.persist(&entries)
    }

    /// Delete every chunk of an item.
    pub fn delete_item(&self, item_id: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.retain(|e| e.item_id != item_id);
        self.persist(&entries)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search_sync(
        &self,
        query_embedding: &[f32],
        limit: usize,
        item_ids: Option<&[String]>,
    ) -> Vec<VectorHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &IndexedChunk)> = entries
            .iter()
            .filter(|e| item_ids.map_or(true, |ids| ids.contains(&e.item_id)))
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                chunk_id: e.chunk_id.clone(),
                item_id: e.item_id.clone(),
                title: e.title.clone(),
                authors: e.authors.clone(),
                content: e.content.clone(),
                page_number: e.page_number,
                external_key: e.external_key.clone(),
                similarity: score.clamp(0.0, 1.0),
            })
            .collect()
    }

    pub fn stats(&self) -> CorpusStats {
        let entries = self.entries.read();
        let items: HashSet<&str> = entries.iter().map(|e| e.item_id.as_str()).collect();
        CorpusStats {
            items: items.len(),
            chunks: entries.len(),
        }
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[IndexedChunk]) -> Result<()> {
        let data = serde_json::to_string(entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, &self.persist_path).context("Failed to replace vector store")?;
        Ok(())
    }
}

#[async_trait]
impl VectorSearchProvider for VectorStore {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&[String]>,
    ) -> Result<Vec<VectorHit>> {
        Ok(self.search_sync(vector, top_k, filter))
    }

    async fn corpus_stats(&self) -> Result<CorpusStats> {
        Ok(self.stats())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
