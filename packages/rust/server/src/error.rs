//! Mapping of request failures to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use hottake_shared::HotTakeError;

/// A failure that happens before the event stream starts.
#[derive(Debug)]
pub struct ApiError(pub HotTakeError);

impl From<HotTakeError> for ApiError {
    fn from(err: HotTakeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HotTakeError::Validation { .. } => StatusCode::BAD_REQUEST,
            HotTakeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::BAD_REQUEST {
            self.0.to_string()
        } else {
            warn!(error = %self.0, "request failed");
            hottake_protocol::GENERIC_FAILURE_MESSAGE.to_string()
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "kind": self.0.kind() })),
        )
            .into_response()
    }
}
