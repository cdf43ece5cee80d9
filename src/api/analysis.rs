use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::analysis::AnalysisRequest;
use crate::api::json_event;
use crate::cancel::CancellationToken;
use crate::config::AnalysisOptions;
use crate::error::AnalysisError;
use crate::models::{AnalysisState, AnalyzeRequest, UnitResult};
use crate::state::AppState;

/// POST /api/analysis - Analyze a whole document, streaming SSE events:
/// `progress` after each unit, then one of `results`, `cancelled`, `error`.
/// Closing the connection cancels the run.
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let scope = req.scope.trim().to_string();
    if scope.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Scope is required".to_string()));
    }

    let permit = state
        .analysis_permit
        .clone()
        .try_acquire_owned()
        .map_err(|_| {
            (
                StatusCode::CONFLICT,
                "An analysis is already running; cancel it first".to_string(),
            )
        })?;

    let request = AnalysisRequest {
        options: AnalysisOptions::resolve(&req, &state.config.retrieval),
        scope,
        text: req.text,
    };

    let cancel = CancellationToken::new();
    let disconnect_guard = cancel.drop_guard();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let analyzer = state.analyzer.clone();

    tokio::spawn(async move {
        let _permit = permit;
        let progress_tx = tx.clone();
        let outcome = analyzer
            .analyze_document(&request, cancel, move |progress| {
                let _ = progress_tx.send(json_event("progress", &progress));
            })
            .await;

        let event = match outcome {
            Ok(units) => json_event("results", &json!({ "scope": request.scope, "units": units })),
            Err(AnalysisError::Cancelled) => {
                json_event("cancelled", &json!({ "scope": request.scope }))
            }
            Err(e) => {
                tracing::warn!("Analysis of scope {} failed: {e}", request.scope);
                json_event("error", &json!({ "message": e.to_string() }))
            }
        };
        let _ = tx.send(event);
    });

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });

    // Dropping the stream (client gone) drops the guard and cancels the run
    let events = events.map(move |event| {
        let _guard = &disconnect_guard;
        event
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// POST /api/analysis/cancel
pub async fn cancel(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.analyzer.cancel_analysis();
    Json(json!({ "cancelled": cancelled }))
}

/// GET /api/analysis/status
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let current: AnalysisState = state.analyzer.state();
    Json(json!({ "state": current }))
}

/// GET /api/analysis/{scope}/units/{unit_id}
pub async fn unit_result(
    State(state): State<AppState>,
    Path((scope, unit_id)): Path<(String, String)>,
) -> Result<Json<UnitResult>, (StatusCode, String)> {
    state
        .analyzer
        .results_for_unit(&scope, &unit_id)
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("No cached result for unit {unit_id}"),
        ))
}

/// GET /api/analysis/{scope}/units
pub async fn unit_results(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> Json<Vec<UnitResult>> {
    Json(state.analyzer.all_cached_results(&scope))
}

/// DELETE /api/analysis/{scope}/cache
pub async fn clear_cache(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> StatusCode {
    if state.analyzer.clear_cache(&scope) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
