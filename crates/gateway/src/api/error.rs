//! Error-to-HTTP mapping: every failure body is `{ok:false, error}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use wd_domain::error::Error;

/// Wrapper giving domain errors an HTTP shape.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Integrity(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"ok": false, "error": self.0.to_string()}))).into_response()
    }
}

/// Parse a JSON body into a typed request, folding serde failures (unknown
/// keys, wrong types) into validation errors.
pub fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(body)
        .map_err(|e| ApiError(Error::Validation(e.to_string())))
}

/// JSON body extractor whose rejection keeps the `{ok:false, error}` shape
/// instead of axum's plain-text default.
pub struct JsonBody(pub serde_json::Value);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequest<S> for JsonBody {
    type Rejection = ApiError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match axum::Json::<serde_json::Value>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError(Error::Validation(rejection.body_text()))),
        }
    }
}
