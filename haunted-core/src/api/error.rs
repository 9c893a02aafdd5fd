use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::HauntedError;

/// A [`HauntedError`] rendered as a JSON `{error, code}` response.
#[derive(Debug)]
pub struct ApiError(pub HauntedError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HauntedError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            HauntedError::InvalidState { .. } | HauntedError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            HauntedError::InvalidInput(_) | HauntedError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HauntedError> for ApiError {
    fn from(err: HauntedError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            self.0.log();
        }
        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
