//! Unified API error type and conversions.

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;
use std::io::ErrorKind;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    EmptyBody,
    NotFound(String),
    PayloadTooLarge(String),
    Decode(String),
    Conflict(String),
    TooManyRequests(u64),
    Internal(String),
}

/// Wire shape of every error response.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::EmptyBody => (
                StatusCode::BAD_REQUEST,
                "empty_body",
                "chunk body is empty".into(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Decode(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "decode_failed", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::TooManyRequests(retry_after) => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                format!("retry after {retry_after} seconds"),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::TooManyRequests(secs) => Some(*secs),
            _ => None,
        };
        let (status, error, detail) = self.parts();
        let mut headers = HeaderMap::new();
        if let Some(secs) = retry_after
            && secs > 0
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            headers.insert(header::RETRY_AFTER, value);
        }
        (status, headers, JsonResponse(ErrorBody { error, detail })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName => ApiError::BadRequest("invalid name".into()),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

impl From<base64::DecodeError> for ApiError {
    fn from(error: base64::DecodeError) -> Self {
        ApiError::Decode(error.to_string())
    }
}
