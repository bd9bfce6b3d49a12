//! # Local media storage
//!
//! Files are written under `root`, sharded by the first two characters of
//! their key ("ab/abcdef….png"). Retrieval URLs point back at this server's
//! `/media/{key}` route and carry an expiry plus an HMAC-SHA256 signature
//! over `key:expires`, so a URL stops working once it expires.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use mime::Mime;
use sha2::Sha256;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use domains::{AppError, MediaStorage, MediaUpload, Result};

type HmacSha256 = Hmac<Sha256>;

/// The usual extension for `content_type`. `mime_guess` lists extensions
/// alphabetically ("jfif" before "jpg"), so common types are pinned here.
fn extension_for(content_type: &Mime) -> &'static str {
    let usual = match content_type.essence_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "audio/mpeg" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "audio/wav" => Some("wav"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "application/octet-stream" => Some("bin"),
        _ => None,
    };
    usual
        .or_else(|| {
            mime_guess::get_mime_extensions(content_type)
                .and_then(|exts| exts.first())
                .copied()
        })
        .unwrap_or("bin")
}

pub struct LocalMediaStorage {
    /// Root directory for all uploads (e.g., "./data/media")
    root: PathBuf,
    /// Public base URL of this server (e.g., "http://localhost:8080")
    public_base_url: String,
    signing_key: Vec<u8>,
    url_ttl: Duration,
}

impl LocalMediaStorage {
    pub fn new(root: PathBuf, public_base_url: &str, signing_key: &[u8], url_ttl: Duration) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.to_vec(),
            url_ttl,
        }
    }

    /// Keys are generated here, so anything outside `[a-z0-9.]` is forged.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = key.len() > 2
            && !key.starts_with('.')
            && !key.contains("..")
            && key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.');
        if !valid {
            return Err(AppError::validation(format!("invalid media key {key:?}")));
        }
        Ok(self.root.join(&key[..2]).join(key))
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key).map_err(AppError::upstream)?;
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn signature(&self, key: &str, expires: i64) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// Checks a `/media/{key}?expires=..&signature=..` request.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<()> {
        if expires < Utc::now().timestamp() {
            return Err(AppError::Unauthorized("media link has expired".into()));
        }
        let raw = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AppError::Unauthorized("malformed media signature".into()))?;
        self.mac(key, expires)?
            .verify_slice(&raw)
            .map_err(|_| AppError::Unauthorized("invalid media signature".into()))
    }

    /// Reads a stored object and guesses its content type from the key.
    pub async fn open(&self, key: &str) -> Result<(Bytes, Mime)> {
        let path = self.path_for(key)?;
        let data = fs::read(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => AppError::not_found("Media", key),
            _ => AppError::upstream(err),
        })?;
        Ok((Bytes::from(data), mime_guess::from_path(key).first_or_octet_stream()))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn upload(&self, upload: MediaUpload) -> Result<String> {
        let key = format!("{}.{}", Uuid::new_v4().simple(), extension_for(&upload.content_type));

        let path = self.path_for(&key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(AppError::upstream)?;
        }
        fs::write(&path, &upload.data).await.map_err(AppError::upstream)?;
        debug!(media_key = %key, bytes = upload.data.len(), "media stored");
        Ok(key)
    }

    async fn signed_url(&self, key: &str) -> Result<String> {
        self.path_for(key)?;
        let expires = Utc::now().timestamp() + self.url_ttl.as_secs() as i64;
        Ok(format!(
            "{}/media/{key}?expires={expires}&signature={}",
            self.public_base_url,
            self.signature(key, expires)?
        ))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::upstream(err)),
        }
    }
}
