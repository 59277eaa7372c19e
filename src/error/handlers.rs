//! Error handlers
//!
//! Converts domain errors into JSON HTTP responses.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;

use crate::error::types::{StatsError, StorageError};

/// Convert a storage error to its HTTP status code
pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        StorageError::BadRequest(_) => StatusCode::BAD_REQUEST,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::AlreadyExists(_) => StatusCode::CONFLICT,
        StorageError::OperationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        StorageError::Stats(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error returned from HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let status = status_for(&err);
        Self::new(status, err.to_string())
    }
}

impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), format!("Failed to read upload: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status.as_u16(), self.message);
        } else {
            warn!("{} {}", self.status.as_u16(), self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
