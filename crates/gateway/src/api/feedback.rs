use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use wd_domain::event::EventRecord;
use wd_domain::requests::FeedbackRequest;

use crate::api::error::{parse_body, ApiError, JsonBody};
use crate::state::AppState;

/// `POST /feedback` — log a user rating against a known request.
pub async fn record_feedback(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: FeedbackRequest = parse_body(body)?;
    request.validate()?;

    let request_id = request.request_id.trim().to_owned();
    let intent = state
        .logbook
        .get_intent(&request_id)?
        .ok_or_else(|| wd_domain::Error::NotFound(format!("request_id not found: {request_id}")))?;

    let reviewer = request
        .reviewer
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("user");
    let feedback_id = state.logbook.insert_feedback(
        &request_id,
        request.rating,
        request.correction_text.as_deref(),
        reviewer,
        &state.clock.now_iso(),
    )?;

    let session_id = request.session_id.clone().or(intent.session_id);
    let mode = request
        .mode
        .map(|m| m.as_str().to_owned())
        .unwrap_or(intent.mode);
    let event = EventRecord::new(
        "USER_FEEDBACK",
        "brainstem_api",
        state.clock.now_iso(),
        json!({
            "request_id": request_id,
            "feedback_id": feedback_id,
            "rating": request.rating,
            "has_correction": request.correction_text.is_some(),
            "reviewer": reviewer,
        }),
    )
    .session_id(session_id)
    .correlation_id(Some(request_id.clone()))
    .mode(Some(mode));
    state.logbook.record_event(&event)?;

    Ok(Json(json!({
        "ok": true,
        "feedback_id": feedback_id,
        "request_id": request_id,
        "rating": request.rating,
    })))
}
