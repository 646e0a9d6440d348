use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use wd_domain::intent::IntentProposal;

use crate::api::error::{ApiError, JsonBody};
use crate::state::AppState;

/// `POST /intent` — validate and upsert an intent proposal; every proposed
/// action lands in the queue as `queued`.
pub async fn upsert_intent(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let intent = IntentProposal::from_value(body)?;
    let queued = state
        .logbook
        .upsert_intent(&intent, "brainstem_api", &state.clock.now_iso())?;
    Ok(Json(json!({
        "ok": true,
        "request_id": intent.request_id,
        "queued_actions": queued,
    })))
}
