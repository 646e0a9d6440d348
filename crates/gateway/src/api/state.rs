//! State endpoints: read the current-state map, ingest observed items.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use wd_domain::event::EventRecord;
use wd_domain::requests::StateIngestRequest;
use wd_logbook::StateWrite;

use crate::api::error::{parse_body, ApiError, JsonBody};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub key: Option<String>,
}

/// `GET /state?key=` — one key or the whole map.
pub async fn query_state(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let items = match query.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => state.logbook.get_state(key)?.into_iter().collect(),
        None => state.logbook.list_state()?,
    };
    Ok(Json(json!({"ok": true, "count": items.len(), "items": items})))
}

/// `POST /state` — validate and upsert a batch of observed state items,
/// emitting `STATE_UPDATED` only for keys whose value changed.
pub async fn ingest_state(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: StateIngestRequest = parse_body(body)?;
    request.validate()?;

    let source = "brainstem_api";
    let emit_events = request.emit_events.unwrap_or(true);
    let now = state.clock.now_iso();

    let writes: Vec<StateWrite> = request
        .items
        .iter()
        .map(|item| {
            let observed_at = item.observed_at_utc.clone().unwrap_or_else(|| now.clone());
            let event = emit_events.then(|| {
                EventRecord::new(
                    "STATE_UPDATED",
                    item.source.clone(),
                    now.clone(),
                    json!({
                        "state_key": item.state_key,
                        "source": item.source,
                        "confidence": item.confidence,
                        "observed_at_utc": observed_at,
                    }),
                )
                .session_id(request.session_id.clone())
                .correlation_id(request.correlation_id.clone())
            });
            StateWrite {
                state_key: item.state_key.trim().to_owned(),
                state_value: item.state_value.clone(),
                source: item.source.trim().to_owned(),
                confidence: item.confidence,
                observed_at_utc: observed_at,
                updated_at_utc: now.clone(),
                event,
            }
        })
        .collect();

    let state_keys: Vec<String> = writes.iter().map(|w| w.state_key.clone()).collect();
    let result = state.logbook.batch_set_state(writes)?;
    tracing::debug!(
        source,
        upserted = result.upserted,
        changed = result.changed,
        "state ingested"
    );

    Ok(Json(json!({
        "ok": true,
        "upserted": result.upserted,
        "changed": result.changed,
        "state_keys": state_keys,
    })))
}
