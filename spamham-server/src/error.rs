//! API error types with IntoResponse
//!
//! Core errors are converted to JSON responses with appropriate status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use spamham_core::Error;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Caller sent something unusable (400)
    BadRequest { code: &'static str, message: String },

    /// Item absent or already categorized (404)
    NotFound { message: String },

    /// Authenticated but not allowed (403)
    Forbidden { reason: String },

    /// Deadline elapsed while waiting on the store (504)
    Timeout { message: String },

    /// Categorize stopped part way; drift left for reconciliation (500)
    Partial { message: String },

    /// Store or counter failure (500, logged)
    Store(Error),
}

impl ApiError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": code,
                    "message": message
                }),
            ),
            Self::NotFound { message } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": message
                }),
            ),
            Self::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "forbidden",
                    "message": reason
                }),
            ),
            Self::Timeout { message } => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({
                    "error": "timeout",
                    "message": message
                }),
            ),
            Self::Partial { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "partial_categorize",
                    "message": message
                }),
            ),
            Self::Store(e) => {
                // Log the actual error, return generic message
                tracing::error!("Store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "store_unavailable",
                        "message": "the store is unavailable, try again later"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidTarget { .. } => Self::BadRequest {
                code: "invalid_target",
                message: e.to_string(),
            },
            Error::InvalidKey { .. } => Self::BadRequest {
                code: "invalid_key",
                message: e.to_string(),
            },
            Error::InvalidPayload { .. } => Self::BadRequest {
                code: "invalid_payload",
                message: e.to_string(),
            },
            Error::NotFound { .. } => Self::NotFound {
                message: e.to_string(),
            },
            Error::DeadlineExceeded { .. } | Error::CounterOutcomeUnknown { .. } => Self::Timeout {
                message: e.to_string(),
            },
            Error::PartialCategorize(_) => Self::Partial {
                message: e.to_string(),
            },
            Error::Contention { .. }
            | Error::StoreUnavailable { .. }
            | Error::Database(_)
            | Error::CounterUnavailable { .. } => Self::Store(e),
        }
    }
}
