use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Every handler returns this. The message is what the client sees, except for
/// storage and internal failures which are logged and replaced by a generic text.
#[derive(Debug, Error)]
pub enum AppError {
    /// Target entity or like row does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate like attempt. HTTP 403, no state change.
    #[error("already liked")]
    AlreadyLiked,

    /// Missing or invalid bearer token. HTTP 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but neither author nor staff. HTTP 403.
    #[error("{0}")]
    Forbidden(String),

    /// Request body failed validation. HTTP 400.
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str, id: i64) -> Self {
        AppError::NotFound(format!("{what} {id} not found"))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyLiked => "ALREADY_LIKED",
            AppError::Unauthorized(_) => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "PERMISSION_DENIED",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyLiked => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Storage(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::TargetNotFound { kind, id } => AppError::not_found(kind.label(), id),
            LedgerError::NotLiked { kind, id } => {
                AppError::NotFound(format!("no like on {} {id}", kind.label()))
            }
            LedgerError::AlreadyLiked { .. } => AppError::AlreadyLiked,
            LedgerError::Storage(e) => AppError::Storage(e.to_string()),
        }
    }
}
