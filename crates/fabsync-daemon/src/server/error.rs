use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::SyncError;

/// A [`SyncError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            SyncError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::NotSwitchable(_) => StatusCode::CONFLICT,
            SyncError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            SyncError::Transport(_) | SyncError::CommandFailure { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "error": self.0.to_string() });
        if let SyncError::CommandFailure {
            status: Some(upstream),
            ..
        } = &self.0
        {
            body["upstreamStatus"] = json!(upstream);
        }
        (status, Json(body)).into_response()
    }
}
