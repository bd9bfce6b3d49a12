//! # api-adapters
//!
//! HTTP surface. The envelope, status mapping and metrics are plain data and
//! always compiled; the axum router lives behind the `web-axum` feature.

pub mod envelope;
pub mod metrics;
pub mod status;
#[cfg(feature = "web-axum")]
pub mod web;

pub use envelope::Envelope;
pub use metrics::Metrics;
pub use status::status_for;
