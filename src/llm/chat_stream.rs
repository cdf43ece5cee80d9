//! Streamed chat completion with an owned cancellation signal.
//!
//! The stream is an explicit value handed to the caller together with the
//! token that ends it; nothing is parked on shared state.

use anyhow::{Context, Result};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::LlmConfig;
use crate::models::ChatMessage;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const STREAM_TIMEOUT_SECS: u64 = 300;

/// Wire dialect of the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// Newline-delimited JSON objects from `/api/chat`.
    Ollama,
    /// `data: {...}` SSE lines from `/v1/chat/completions`.
    OpenAi,
}

impl Dialect {
    fn from_provider(provider: &str) -> Result<Self> {
        match provider {
            "ollama" => Ok(Dialect::Ollama),
            "openai" => Ok(Dialect::OpenAi),
            other => anyhow::bail!("Unsupported LLM provider for chat: {other}"),
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        match self {
            Dialect::Ollama => format!("{base_url}/api/chat"),
            Dialect::OpenAi => format!("{base_url}/v1/chat/completions"),
        }
    }

    /// Returns `Some(Ok(delta))` for content, `Some(Err)` for malformed input,
    /// `None` for lines that carry nothing (blank, done markers, role-only).
    fn parse_line(self, line: &str) -> Option<Result<String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match self {
            Dialect::Ollama => match serde_json::from_str::<OllamaStreamChunk>(line) {
                Ok(chunk) if chunk.done => None,
                Ok(chunk) => non_empty(chunk.message.content),
                Err(e) => Some(Err(anyhow::anyhow!("Failed to parse Ollama chunk: {e}"))),
            },
            Dialect::OpenAi => {
                let data = line.strip_prefix("data: ")?.trim();
                if data == "[DONE]" {
                    return None;
                }
                match serde_json::from_str::<OpenAiStreamChunk>(data) {
                    Ok(chunk) => non_empty(
                        chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .unwrap_or_default(),
                    ),
                    Err(e) => Some(Err(anyhow::anyhow!("Failed to parse OpenAI chunk: {e}"))),
                }
            }
        }
    }
}

fn non_empty(content: String) -> Option<Result<String>> {
    if content.is_empty() {
        None
    } else {
        Some(Ok(content))
    }
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: StreamMessage,
    done: bool,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

/// Stream chat completion deltas. The stream ends early once `cancel` fires.
pub async fn stream_chat(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: Vec<ChatMessage>,
    cancel: CancellationToken,
) -> Result<ChatStream> {
    let dialect = Dialect::from_provider(&config.provider)?;

    let req = StreamRequest {
        model: config.chat_model.clone(),
        messages: messages
            .into_iter()
            .map(|m| StreamMessage {
                role: m.role,
                content: m.content,
            })
            .collect(),
        stream: true,
    };

    let mut builder = client
        .post(dialect.endpoint(&config.base_url))
        .timeout(Duration::from_secs(STREAM_TIMEOUT_SECS))
        .json(&req);
    if dialect == Dialect::OpenAi {
        builder = builder.header(
            "Authorization",
            format!("Bearer {}", config.api_key.as_deref().unwrap_or("")),
        );
    }

    let resp = builder
        .send()
        .await
        .context("Failed to connect to LLM for chat streaming")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Chat API returned {status}: {body}");
    }

    let deltas = stream_lines(resp.bytes_stream()).filter_map(move |line_result| async move {
        match line_result {
            Ok(line) => dialect.parse_line(&line),
            Err(e) => Some(Err(e)),
        }
    });

    Ok(until_cancelled(deltas, cancel))
}

/// Stop yielding as soon as `cancel` is observed. Checked per item, so an
/// in-flight read finishes before the stream ends.
pub fn until_cancelled<S>(stream: S, cancel: CancellationToken) -> ChatStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(stream.take_while(move |_| future::ready(!cancel.is_cancelled())))
}

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline_pos).collect();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.push_str(&String::from_utf8_lossy(&bytes)),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        if buffer.trim().is_empty() {
                            return None;
                        }
                        let remaining = std::mem::take(&mut buffer);
                        return Some((Ok(remaining), (stream, buffer)));
                    }
                }
            }
        },
    )
}
