//! HTTP error mapping
//!
//! Every handler returns [`AppResult`]; errors render as
//!
//! ```json
//! { "code": "E0002", "message": "copies must be between 1 and 100" }
//! ```
//!
//! | Code | Status | Meaning |
//! |------|--------|---------|
//! | E3001 | 401 | missing or wrong API key |
//! | E0002 | 400 | request validation |
//! | E0003 | 404 | unknown job or printer |
//! | E0006 | 400 | undecodable image |
//! | E9001 | 500 | internal |

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use receipt_printer::DecodeError;
use serde::Serialize;
use tracing::error;

use crate::queue::QueueError;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid or missing API key")]
    /// 401
    Unauthorized,

    #[error("Resource not found: {0}")]
    /// 404
    NotFound(String),

    #[error("Validation failed: {0}")]
    /// 400
    Validation(String),

    #[error("Invalid image: {0}")]
    /// 400
    InvalidImage(String),

    #[error("Internal server error: {0}")]
    /// 500
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "E3001", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "E0003", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "E0002", msg.clone()),
            AppError::InvalidImage(msg) => (StatusCode::BAD_REQUEST, "E0006", msg.clone()),
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "E9001",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorBody {
            code: code.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::InvalidArgument(msg) => AppError::Validation(msg),
            QueueError::NotFound(id) => AppError::NotFound(format!("Job {} not found", id)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(e: DecodeError) -> Self {
        AppError::InvalidImage(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}
