//! # AppError
//!
//! Centralized error handling for Agora.
//! Every adapter maps its library failures onto one of these kinds so the
//! HTTP layer can pick a status code without knowing where the error came from.

use thiserror::Error;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., Post, Comment, User)
    #[error("{0} not found with id of {1}")]
    NotFound(String, String),

    /// Missing or malformed input (e.g., empty title, bad id)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The voter already holds a vote in the requested direction
    #[error("already voted: {0}")]
    AlreadyVoted(String),

    /// Missing, invalid or superseded credential
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to touch this resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation (e.g., duplicate username)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store operation failed
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Media storage / URL signing failed
    #[error("upstream error: {0}")]
    UpstreamError(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::PersistenceError(err.to_string())
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamError(err.to_string())
    }
}

/// A specialized Result type for Agora logic.
pub type Result<T> = std::result::Result<T, AppError>;
