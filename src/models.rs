use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a working document is split into units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Section,
    #[default]
    Paragraph,
    Sentence,
}

impl Granularity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "section" => Some(Granularity::Section),
            "paragraph" => Some(Granularity::Paragraph),
            "sentence" => Some(Granularity::Sentence),
            _ => None,
        }
    }
}

/// Kind of a segmented unit; mirrors the granularity that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Section,
    Paragraph,
    Sentence,
}

/// A segment of the working document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextUnit {
    /// Content hash; identical content yields the same id.
    pub id: String,
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub kind: UnitKind,
    pub title: Option<String>,
}

/// Document-level context used to enrich a unit's query. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentContext {
    pub title: Option<String>,
    pub current_section: Option<String>,
}

/// Whether a recommendation came from retrieval or from citation-graph expansion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Retrieved,
    Related,
}

/// A corpus item recommended for a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub item_id: String,
    pub chunk_id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// In [0, 1].
    pub similarity: f32,
    pub preview: String,
    pub external_key: Option<String>,
    pub page_number: Option<u32>,
    #[serde(default)]
    pub origin: Origin,
}

/// Retrieval result for one unit of the working document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitResult {
    pub unit_id: String,
    pub unit: TextUnit,
    pub recommendations: Vec<Recommendation>,
    /// True when every candidate fell below the threshold and the top few were
    /// kept anyway.
    #[serde(default)]
    pub fallback_applied: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Progress of a whole-document analysis, emitted after each unit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub label: String,
}

impl AnalysisProgress {
    pub fn new(current: usize, total: usize, label: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((current * 100) / total).min(100) as u8
        };
        Self {
            current,
            total,
            percentage,
            label: label.into(),
        }
    }
}

/// Lifecycle of the analyzer's most recent run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    Running,
    Done,
    Cancelled,
    Failed,
}

/// Analyze request. Unset options fall back to the configured defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    /// Cache scope, typically the project the document belongs to.
    pub scope: String,
    pub text: String,
    pub granularity: Option<Granularity>,
    pub max_results: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub use_reranking: Option<bool>,
    pub use_multilingual: Option<bool>,
}

/// Search request (conversational path).
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub use_reranking: Option<bool>,
    pub use_multilingual: Option<bool>,
    pub graph_expansion: Option<bool>,
    pub summaries: Option<bool>,
    #[serde(default)]
    pub chunk_level: bool,
    /// Restrict retrieval to these corpus items.
    pub item_ids: Option<Vec<String>>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Recommendation>,
    pub related: Vec<Recommendation>,
    pub fallback_applied: bool,
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Option<Vec<ChatMessage>>,
    pub item_ids: Option<Vec<String>>,
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Source reference sent in the SSE `context` event
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnippet {
    pub item_id: String,
    pub title: String,
    pub page_number: Option<u32>,
    pub similarity: f32,
}

/// LLM config update request
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfigUpdate {
    pub provider: Option<String>,
    // base_url intentionally omitted: immutable at runtime to prevent SSRF
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
    pub api_key: Option<String>,
    pub embedding_dim: Option<usize>,
}
