//! # services
//!
//! Application services: each public method is one API operation, expressed
//! against the port traits in `domains`. Services are cheap to share behind
//! `Arc` and hold no per-request state.

pub mod auth_service;
pub mod comment_service;
pub mod post_service;
pub mod vote_service;

pub use auth_service::{AuthService, Credentials, Registration, Session};
pub use comment_service::{CommentService, CreateComment};
pub use post_service::{CreatePost, PostService};
pub use vote_service::VoteService;

use domains::{AppError, Result};

/// Trims `value` and rejects it when nothing is left.
pub(crate) fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Like [`required`], but passes `None` through.
pub(crate) fn optional(field: &str, value: Option<String>) -> Result<Option<String>> {
    value.map(|v| required(field, &v)).transpose()
}
