use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use wd_logbook::EventQuery;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub since: Option<String>,
}

/// `GET /events` — recent audit events, newest first.
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = state.logbook.list_events(&EventQuery {
        limit: params.limit,
        event_type: params.event_type,
        session_id: params.session_id,
        correlation_id: params.correlation_id,
        since: params.since,
    })?;
    Ok(Json(json!({"ok": true, "count": items.len(), "items": items})))
}
