//! Mapping of errors to HTTP responses
//!
//! Validation errors echo their message; execution errors are logged with
//! full detail and answered with a generic message, so paths and commands
//! never reach the client.

use crate::error::MapmergeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) => m,
            Self::Internal(m) => m,
        }
    }
}

impl From<MapmergeError> for ApiError {
    fn from(err: MapmergeError) -> Self {
        if err.is_validation() {
            return Self::BadRequest(err.root().to_string());
        }

        error!("Request failed: {}", err);
        match err.root() {
            MapmergeError::Merge { .. } => Self::Internal("Failed to merge the maps, try again."),
            MapmergeError::Render { .. }
            | MapmergeError::RenderTimeout { .. }
            | MapmergeError::CommandFailed { .. } => Self::Internal("Failed to render the map."),
            _ => Self::Internal("Internal server error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
