// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by every flow.

/// Application error type returned by the authentication core.
///
/// Each variant maps to one tag of the error taxonomy the HTTP layer renders.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status code the web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::NotAcceptable(_) => 406,
            AppError::Conflict(_) => 409,
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                500
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                500
            }
        }
    }

    /// Short machine-readable tag for the error body.
    pub fn tag(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::NotAcceptable(_) => "not_acceptable",
            AppError::NotFound(_) => "not_found",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// True for failures caused by the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized(_))
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
