use axum::extract::State;
use axum::response::Json;

use wd_domain::requests::AssistRequest;

use crate::api::error::{parse_body, ApiError, JsonBody};
use crate::runtime::assist as orchestrator;
use crate::state::AppState;

/// `POST /assist` — planner call, validation, persistence, and a dry policy
/// preview of every proposed action.
pub async fn assist(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: AssistRequest = parse_body(body)?;
    request.validate()?;
    let response = orchestrator::handle_assist(&state, &request, "assist_orchestrator").await?;
    Ok(Json(serde_json::to_value(&response).map_err(wd_domain::Error::from)?))
}
