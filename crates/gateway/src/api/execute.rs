use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use wd_domain::requests::ExecuteRequest;

use crate::api::error::{parse_body, ApiError, JsonBody};
use crate::runtime::executor;
use crate::state::AppState;

/// `POST /execute` — run the queued actions of an intent through the
/// mode/high-risk/policy gates and, where approved, the actuator.
pub async fn execute_actions(
    State(state): State<AppState>,
    JsonBody(body): JsonBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: ExecuteRequest = parse_body(body)?;
    request.validate()?;
    let response = executor::execute_actions(&state, &request, "brainstem_api").await?;
    let mut value = serde_json::to_value(&response).map_err(wd_domain::Error::from)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("ok".into(), json!(true));
    }
    Ok(Json(value))
}
