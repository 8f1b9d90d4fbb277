use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::ValidationErrors;

use crate::services::{AttemptStoreError, ChartError};

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    NotImplemented(String),
    Internal(String),
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<AttemptStoreError> for ApiError {
    fn from(err: AttemptStoreError) -> Self {
        match err {
            AttemptStoreError::Validation(message) => ApiError::BadRequest(message),
            AttemptStoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            AttemptStoreError::TransactionAborted => ApiError::Conflict(err.to_string()),
            AttemptStoreError::Kv(_) | AttemptStoreError::Serialization(_) => {
                tracing::error!(error = %err, "attempt store failure");
                ApiError::internal("Attempt storage is unavailable")
            }
        }
    }
}

impl From<ChartError> for ApiError {
    fn from(err: ChartError) -> Self {
        match err {
            ChartError::InvalidDuration(_) | ChartError::OutOfRange => {
                ApiError::BadRequest(err.to_string())
            }
            ChartError::Unimplemented(_) => ApiError::NotImplemented(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::BadRequest(format!("Validation failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::NotImplemented(message) => (StatusCode::NOT_IMPLEMENTED, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
