//! Unified error handling for Roster Core
//!
//! Every stage and handler reports failures as [`AppError`]. Rendering an
//! `AppError` only records a [`Failure`] on the response; the uniform client
//! body is produced once, by the error translation stage
//! (`middleware::error_response`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(e) => database_status(e),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::NOT_ACCEPTABLE => "not_acceptable",
            StatusCode::CONFLICT => "conflict",
            StatusCode::UNPROCESSABLE_ENTITY => "validation",
            _ => "internal_error",
        }
    }

    /// Message shown to clients
    pub fn message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotAcceptable(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg) => msg.clone(),
            AppError::Database(e) => match e {
                sqlx::Error::RowNotFound => "Not found".to_string(),
                sqlx::Error::Database(db) if database_status(e) != StatusCode::INTERNAL_SERVER_ERROR => {
                    db.message().to_string()
                }
                _ => "A database error occurred".to_string(),
            },
            AppError::Internal(e) => e.to_string(),
        }
    }

    /// Snapshot of this error for the translation stage
    pub fn to_failure(&self) -> Failure {
        Failure {
            status: self.status(),
            kind: self.kind(),
            message: self.message(),
            trace: format!("{:?}", self),
        }
    }
}

/// Database failures are classified the way the store reports them:
/// uniqueness clashes are conflicts, referential and null violations are
/// refused writes, everything else is a server fault.
fn database_status(error: &sqlx::Error) -> StatusCode {
    match error {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => StatusCode::CONFLICT,
            sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::NotNullViolation => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Failure recorded in response extensions.
///
/// Inner stages attach it; the error translation stage turns it into the
/// uniform error body, logs it and notifies on 5xx.
#[derive(Debug, Clone)]
pub struct Failure {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    /// Diagnostic trace (Debug rendering of the error chain)
    pub trace: String,
}

impl Failure {
    /// Failure for a bare error status produced outside our handlers
    /// (unknown route, body rejection, wrong method).
    pub fn from_status(status: StatusCode) -> Self {
        let (kind, message) = match status {
            StatusCode::BAD_REQUEST => ("bad_request", "Invalid request body"),
            StatusCode::UNAUTHORIZED => ("unauthorized", "Authentication required"),
            StatusCode::FORBIDDEN => ("forbidden", "Access denied"),
            StatusCode::NOT_FOUND => ("not_found", "Not found"),
            StatusCode::METHOD_NOT_ALLOWED => ("method_not_allowed", "Method not allowed"),
            StatusCode::NOT_ACCEPTABLE => ("not_acceptable", "Not acceptable"),
            StatusCode::CONFLICT => ("conflict", "Resource conflict"),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                ("unsupported_media_type", "Unsupported content type")
            }
            StatusCode::UNPROCESSABLE_ENTITY => ("validation", "Validation error"),
            _ if status.is_client_error() => ("client_error", "Client error"),
            _ => ("internal_error", "An internal error occurred"),
        };
        Self {
            status,
            kind,
            message: message.to_string(),
            trace: format!("{} {}", status.as_u16(), message),
        }
    }
}

/// Uniform error body sent to clients
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Fallback body, only seen when no translation stage is installed
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = self.to_failure();
        let body = Json(ErrorResponse {
            error: failure.kind,
            message: failure.message.clone(),
        });

        let mut response = (failure.status, body).into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
