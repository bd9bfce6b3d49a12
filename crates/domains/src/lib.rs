//! crates/domains/src/lib.rs
//!
//! Entities, errors, port traits and the pure reply-tree / vote logic of Agora.
//! Nothing in here performs I/O.

pub mod errors;
pub mod models;
pub mod ports;
pub mod search;
pub mod tree;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
