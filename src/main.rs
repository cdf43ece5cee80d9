use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use corpus_match::api;
use corpus_match::config::Config;
use corpus_match::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/analysis", post(api::analysis::analyze))
        .route("/api/analysis/cancel", post(api::analysis::cancel))
        .route("/api/analysis/status", get(api::analysis::status))
        .route("/api/analysis/{scope}/units", get(api::analysis::unit_results))
        .route(
            "/api/analysis/{scope}/units/{unit_id}",
            get(api::analysis::unit_result),
        )
        .route("/api/analysis/{scope}/cache", delete(api::analysis::clear_cache))
        .route("/api/search", post(api::search::search))
        .route("/api/chat", post(api::chat::chat))
        .route(
            "/api/config",
            get(api::config::get_config).put(api::config::update_config),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
