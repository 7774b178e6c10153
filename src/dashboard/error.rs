//! JSON error responses for the dashboard API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::types::FenceError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError(pub FenceError);

impl From<FenceError> for ApiError {
    fn from(e: FenceError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            FenceError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FenceError::InvalidState(_) => StatusCode::CONFLICT,
            FenceError::FeedUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            FenceError::UnknownSymbol { .. } | FenceError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Dashboard request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}
