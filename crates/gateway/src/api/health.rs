use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::state::AppState;

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "watchdeck",
        "ts": state.clock.now_iso(),
    }))
}
