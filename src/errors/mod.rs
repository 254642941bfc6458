//! Error handling module for the project sync service.
//!
//! Subscription and write failures never cross the store boundary as errors;
//! the types here cover the remote seam, local persistence, configuration and
//! the HTTP envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::SyncErrorKind;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// Failure reported by a document service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn permission(message: impl Into<String>) -> Self {
        Self {
            kind: SyncErrorKind::Permission,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: SyncErrorKind::Connection,
            message: message.into(),
        }
    }
}

// SQLite result codes that mean "you may not", not "something broke".
const SQLITE_PERM: &str = "3";
const SQLITE_READONLY: &str = "8";
const SQLITE_AUTH: &str = "23";

/// Whether a SQLite result code (primary or extended) denies access.
fn is_permission_code(code: &str) -> bool {
    // Extended codes carry the primary code in the low byte.
    let primary = code
        .parse::<i64>()
        .map(|n| (n & 0xff).to_string())
        .unwrap_or_else(|_| code.to_string());
    matches!(
        primary.as_str(),
        SQLITE_PERM | SQLITE_READONLY | SQLITE_AUTH
    )
}

impl From<sqlx::Error> for RemoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref().is_some_and(is_permission_code) {
                return RemoteError::permission(db.message().to_string());
            }
        }
        RemoteError::connection(err.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::connection(format!("malformed document: {}", err))
    }
}

/// Failure of the local key/value primitive.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure while opening the project store at startup.
#[derive(Debug, thiserror::Error)]
pub enum OpenStoreError {
    #[error("local database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("remote backend error: {0}")]
    Remote(#[from] RemoteError),
}

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// HTTP-facing error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Resource not found
    #[error("{0}")]
    NotFound(String),
    /// Validation error
    #[error("{0}")]
    Validation(String),
    /// Bad request
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: error.error_code().to_string(),
                message: error.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::new(&self))).into_response()
    }
}
