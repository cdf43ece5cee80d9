pub mod analysis;
pub mod chat;
pub mod config;
pub mod search;

use axum::response::sse::Event;
use serde::Serialize;

/// SSE event carrying `data` as JSON. A payload that fails to serialize
/// becomes an `error` event instead.
pub(crate) fn json_event(name: &str, data: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}
