//! # storage-adapters
//!
//! Implementations of the persistence and media ports.
//!
//! * `memory`: always compiled; lock-per-entry maps and a comment arena.
//! * `postgres`: feature `db-postgres`.
//! * `media::local` / `media::s3`: features `media-local` / `media-s3`.

pub mod media;
pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::{InMemoryCommentRepository, InMemoryPostRepository, InMemoryUserRepository};
