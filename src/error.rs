//! Domain error types for the QA pipeline.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use std::fmt;

use serde::Serialize;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data that is not tied to a single request field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller has no identity or the capability check denied the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Field-level validation of a run, ticket or script request failed
    #[error("Validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// State changed underneath the caller (e.g. a second terminal write)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The external test tool could not be used at all
    #[error("Runner infrastructure failure: {0}")]
    RunnerInfrastructure(String),

    /// A secondary cascade write failed after the run status was persisted
    #[error("Escalation failed: {0}")]
    Escalation(String),
}

impl AppError {
    /// Build a field-level validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the gateway's error body.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RunnerInfrastructure(_) => "RUNNER_INFRASTRUCTURE_FAILURE",
            AppError::Escalation(_) => "ESCALATION_FAILURE",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Escalation(_))
    }
}

/// Error response body handed to the request gateway.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let (message, field) = match err {
            AppError::Database(detail) => {
                tracing::error!("Database error: {}", detail);
                ("An internal database error occurred".to_string(), None)
            }
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            other => (other.to_string(), None),
        };

        ErrorResponse {
            error: err.error_code().to_string(),
            message,
            field,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
