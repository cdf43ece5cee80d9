//! Language-model collaborators: embeddings, single-shot completion,
//! listwise reranking, and streamed chat.

pub mod chat_stream;
pub mod completion;
pub mod embeddings;
pub mod rerank;

use anyhow::Result;
use async_trait::async_trait;

/// Turns text into a dense vector. Fails when the backend is unreachable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Single-shot, non-streaming completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// `context_items` are extra passages the model may consult; they are
    /// sent ahead of the prompt.
    async fn complete(&self, prompt: &str, context_items: &[String]) -> Result<String>;
}
