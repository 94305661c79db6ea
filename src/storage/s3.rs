// datastore-backup/src/storage/s3.rs
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::ServerSideEncryption;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{ObjectInfo, ObjectStore, content_type_for};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// S3 (or S3-compatible) bucket access.
///
/// The SDK client is built on first use and shared by every later call for
/// the lifetime of the process; operations hold no client-side mutable state.
pub struct S3ObjectStore {
    config: StorageConfig,
    client: OnceCell<s3::Client>,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.config.bucket)
            .field("prefix", &self.config.prefix)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl S3ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn client(&self) -> &s3::Client {
        self.client.get_or_init(|| build_client(&self.config)).await
    }
}

async fn build_client(config: &StorageConfig) -> s3::Client {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .operation_timeout(config.operation_timeout)
        .build();

    // Credentials come from the standard provider chain (env, profile, IMDS).
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts);
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    let mut builder = s3::config::Builder::from(&sdk_config);
    if config.endpoint_url.is_some() {
        builder = builder.force_path_style(true);
    }
    info!("Initialized object store client for bucket {}", config.bucket);
    s3::Client::from_conf(builder.build())
}

fn storage_error(operation: &str, key: &str, err: impl std::error::Error) -> AppError {
    AppError::Storage(format!("{} {}: {}", operation, key, DisplayErrorContext(err)))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        let upload_error = |message: String| AppError::Upload {
            key: remote_key.to_string(),
            message,
        };

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| upload_error(format!("cannot read {}: {}", local_path.display(), e)))?;

        debug!(
            "Uploading {} to s3://{}/{}",
            local_path.display(),
            self.config.bucket,
            remote_key
        );
        self.client()
            .await
            .put_object()
            .bucket(&self.config.bucket)
            .key(remote_key)
            .content_type(content_type_for(remote_key))
            .server_side_encryption(ServerSideEncryption::Aes256)
            .body(body)
            .send()
            .await
            .map_err(|e| upload_error(DisplayErrorContext(e).to_string()))?;

        info!("Uploaded s3://{}/{}", self.config.bucket, remote_key);
        Ok(())
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut object = self
            .client()
            .await
            .get_object()
            .bucket(&self.config.bucket)
            .key(remote_key)
            .send()
            .await
            .map_err(|e| storage_error("get", remote_key, e))?;

        let mut output_file = tokio::fs::File::create(local_path).await?;
        let mut total_bytes = 0usize;
        loop {
            let chunk = match object.body.try_next().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(output_file);
                    let _ = tokio::fs::remove_file(local_path).await;
                    return Err(storage_error("read body of", remote_key, e));
                }
            };
            output_file.write_all(&chunk).await?;
            total_bytes += chunk.len();
        }
        output_file.flush().await?;

        info!(
            "Downloaded {} bytes from s3://{}/{} to {}",
            total_bytes,
            self.config.bucket,
            remote_key,
            local_path.display()
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let client = self.client().await;
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| storage_error("list", prefix, e))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let last_modified = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));
                let Some(last_modified) = last_modified else {
                    warn!("Object {} has no usable last-modified time; skipping", key);
                    continue;
                };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects under {}", objects.len(), prefix);
        Ok(objects)
    }

    async fn delete(&self, remote_key: &str) -> Result<()> {
        self.client()
            .await
            .delete_object()
            .bucket(&self.config.bucket)
            .key(remote_key)
            .send()
            .await
            .map_err(|e| storage_error("delete", remote_key, e))?;
        debug!("Deleted s3://{}/{}", self.config.bucket, remote_key);
        Ok(())
    }
}
