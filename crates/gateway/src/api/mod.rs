pub mod assist;
pub mod confirm;
pub mod error;
pub mod events;
pub mod execute;
pub mod feedback;
pub mod health;
pub mod intent;
pub mod state;

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/state", get(state::query_state).post(state::ingest_state))
        .route("/events", get(events::list_events))
        .route("/intent", post(intent::upsert_intent))
        .route("/confirm", post(confirm::record_confirmation))
        .route("/execute", post(execute::execute_actions))
        .route("/feedback", post(feedback::record_feedback))
        .route("/assist", post(assist::assist))
        .fallback(not_found)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"ok": false, "error": "not_found"})),
    )
}
