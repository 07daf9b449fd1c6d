use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::LandwatchError;

pub type ApiResult<T> = Result<T, LandwatchError>;

impl LandwatchError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            LandwatchError::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            LandwatchError::Config(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            LandwatchError::InvalidKey => (StatusCode::BAD_REQUEST, "INVALID_KEY"),
            LandwatchError::NotRunning => (StatusCode::BAD_REQUEST, "NOT_RUNNING"),
            LandwatchError::UnreadableImage { .. } => (StatusCode::BAD_REQUEST, "UNREADABLE_IMAGE"),
            LandwatchError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LandwatchError::Unauthorized | LandwatchError::Auth(_) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for LandwatchError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });
        (status, axum::Json(body)).into_response()
    }
}
