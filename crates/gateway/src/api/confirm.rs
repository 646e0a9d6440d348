//! `POST /confirm` — record an explicit user confirmation so a gated action
//! can pass within the confirmation window.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use wd_domain::event::EventRecord;
use wd_domain::requests::ConfirmRequest;
use wd_domain::time::iso8601_utc_to_epoch;
use wd_logbook::audit::AuditContext;
use wd_policy::canonical_tool_name;
use wd_policy::router::build_confirmation_token;

use crate::api::error::{parse_body, ApiError, JsonBody};
use crate::state::AppState;

pub async fn record_confirmation(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: ConfirmRequest = parse_body(body)?;
    request.validate()?;

    let incident_id = request.incident_id.trim().to_owned();
    let tool_key = canonical_tool_name(request.tool_name.trim());
    let confirm_token = request
        .user_confirm_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| build_confirmation_token(&incident_id, &tool_key));
    let confirmed_at_utc = request
        .confirmed_at_utc
        .clone()
        .unwrap_or_else(|| state.clock.now_iso());
    let confirmed_at_epoch = iso8601_utc_to_epoch(&confirmed_at_utc)?;

    state
        .policy
        .record_confirmation(&incident_id, &tool_key, &confirm_token, confirmed_at_epoch);

    let mode = request.mode.map(|m| m.as_str().to_owned());
    state.logbook.log_decision(
        &incident_id,
        &tool_key,
        json!({
            "allowed": true,
            "requires_confirmation": false,
            "deny_reason_code": "ALLOW",
            "deny_reason_text": null,
            "constraints": {
                "recorded_confirmation": true,
                "confirmed_at_utc": confirmed_at_utc,
            },
        }),
        &AuditContext {
            request_id: request.request_id.clone(),
            action_id: None,
            session_id: request.session_id.clone(),
            mode: mode.clone(),
        },
    );

    let event = EventRecord::new(
        "USER_CONFIRMATION_RECORDED",
        "brainstem_api",
        state.clock.now_iso(),
        json!({
            "incident_id": incident_id,
            "tool_name": tool_key,
            "confirm_token": confirm_token,
            "confirmed_at_utc": confirmed_at_utc,
            "request_id": request.request_id,
        }),
    )
    .session_id(request.session_id.clone())
    .correlation_id(request.request_id.clone().or(Some(incident_id.clone())))
    .mode(mode);
    state.logbook.record_event(&event)?;

    Ok(Json(json!({
        "ok": true,
        "incident_id": incident_id,
        "tool_name": tool_key,
        "confirm_token": confirm_token,
        "confirmed_at_utc": confirmed_at_utc,
    })))
}
