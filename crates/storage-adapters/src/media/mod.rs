//! Media storage backends.

#[cfg(feature = "media-local")]
pub mod local;
#[cfg(feature = "media-s3")]
pub mod s3;

#[cfg(feature = "media-local")]
pub use local::LocalMediaStorage;
#[cfg(feature = "media-s3")]
pub use s3::S3MediaStorage;

/// Default lifetime of a signed media URL.
pub const DEFAULT_URL_TTL_SECS: u64 = 3600;
