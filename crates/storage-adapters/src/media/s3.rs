//! S3-backed media storage with presigned GET URLs.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use domains::{AppError, MediaStorage, MediaUpload, Result};

pub struct S3MediaStorage {
    client: Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3MediaStorage {
    pub fn new(client: Client, bucket: String, url_ttl: Duration) -> Self {
        Self { client, bucket, url_ttl }
    }

    /// Builds a client from the standard AWS environment / profile chain.
    pub async fn from_env(bucket: String, region: Option<String>, url_ttl: Duration) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config), bucket, url_ttl)
    }
}

#[async_trait]
impl MediaStorage for S3MediaStorage {
    async fn upload(&self, upload: MediaUpload) -> Result<String> {
        let key = Uuid::new_v4().simple().to_string();
        let size = upload.data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(upload.content_type.to_string())
            .body(ByteStream::from(upload.data))
            .send()
            .await
            .map_err(|err| AppError::upstream(DisplayErrorContext(&err)))?;
        debug!(media_key = %key, bytes = size, bucket = %self.bucket, "media uploaded");
        Ok(key)
    }

    async fn signed_url(&self, key: &str) -> Result<String> {
        let presigning = PresigningConfig::expires_in(self.url_ttl).map_err(AppError::upstream)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| AppError::upstream(DisplayErrorContext(&err)))?;
        Ok(request.uri().to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| AppError::upstream(DisplayErrorContext(&err)))?;
        Ok(())
    }
}
