use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::models::LlmConfigUpdate;
use crate::state::AppState;

/// Config response with API key redacted
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub provider: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub has_api_key: bool,
    pub retrieval: RetrievalConfig,
}

fn snapshot(state: &AppState) -> ConfigResponse {
    let config = state.llm_config.read();
    ConfigResponse {
        provider: config.provider.clone(),
        base_url: config.base_url.clone(),
        chat_model: config.chat_model.clone(),
        embedding_model: config.embedding_model.clone(),
        embedding_dim: config.embedding_dim,
        has_api_key: config.api_key.is_some(),
        retrieval: state.config.retrieval.clone(),
    }
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(snapshot(&state))
}

/// PUT /api/config - Update LLM model settings. Embedding and completion
/// clients read the shared config per call, so changes apply immediately.
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<LlmConfigUpdate>,
) -> Json<ConfigResponse> {
    {
        let mut config = state.llm_config.write();

        if let Some(provider) = update.provider {
            config.provider = provider;
        }
        // base_url stays as set by LLM_BASE_URL; a runtime change could leak the API key
        if let Some(chat_model) = update.chat_model {
            config.chat_model = chat_model;
        }
        if let Some(embedding_model) = update.embedding_model {
            config.embedding_model = embedding_model;
        }
        if let Some(api_key) = update.api_key {
            config.api_key = Some(api_key);
        }
        if let Some(embedding_dim) = update.embedding_dim {
            config.embedding_dim = embedding_dim;
        }
        tracing::info!(
            "LLM config updated: {} chat={} embed={}",
            config.provider,
            config.chat_model,
            config.embedding_model
        );
    }

    Json(snapshot(&state))
}
