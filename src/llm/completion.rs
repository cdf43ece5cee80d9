use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::CompletionProvider;
use crate::config::LlmConfig;

/// Non-streaming chat completion against the configured provider.
#[derive(Clone)]
pub struct HttpCompletion {
    client: reqwest::Client,
    config: Arc<RwLock<LlmConfig>>,
}

impl HttpCompletion {
    pub fn new(client: reqwest::Client, config: Arc<RwLock<LlmConfig>>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletion {
    async fn complete(&self, prompt: &str, context_items: &[String]) -> Result<String> {
        let config = self.config.read().clone();
        let messages = build_messages(prompt, context_items);

        match config.provider.as_str() {
            "ollama" => call_ollama(&self.client, &config, messages).await,
            "openai" => call_openai(&self.client, &config, messages).await,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }
}

fn build_messages(prompt: &str, context_items: &[String]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !context_items.is_empty() {
        let mut context = String::from("Reference material:\n");
        for (i, item) in context_items.iter().enumerate() {
            context.push_str(&format!("[{}] {}\n", i + 1, item));
        }
        messages.push(Message {
            role: "system".to_string(),
            content: context,
        });
    }
    messages.push(Message {
        role: "user".to_string(),
        content: prompt.to_string(),
    });
    messages
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

async fn call_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: Vec<Message>,
) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url);

    let req = OllamaChatRequest {
        model: config.chat_model.clone(),
        messages,
        stream: false,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama chat API returned {status}: {body}");
    }

    let body: OllamaChatResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama chat response")?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: Vec<Message>,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: config.chat_model.clone(),
        messages,
        temperature: 0.0,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI chat API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI chat API returned {status}: {body}");
    }

    let body: OpenAiChatResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI chat response")?;
    Ok(body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}
