use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::config::QueryOptions;
use crate::models::{SearchRequest, SearchResponse};
use crate::state::AppState;

/// POST /api/search - Conversational search:
///   1. Bilingual query expansion (if enabled)
///   2. Embedding search per variant, max fusion, threshold with fallback
///   3. Listwise LLM rerank (if enabled)
///   4. Citation-graph expansion and summary substitution (if enabled)
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let options = QueryOptions::resolve(&req, &state.config.retrieval);
    let result = state.query.search(&query, &options).await.map_err(|e| {
        tracing::warn!("Search failed: {e:#}");
        (StatusCode::BAD_GATEWAY, format!("Search failed: {e:#}"))
    })?;

    tracing::info!(
        "Search returned {} results and {} related items",
        result.recommendations.len(),
        result.related.len()
    );

    Ok(Json(SearchResponse {
        query,
        results: result.recommendations,
        related: result.related,
        fallback_applied: result.fallback_applied,
    }))
}
