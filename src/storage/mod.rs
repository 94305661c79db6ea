//! Remote artifact storage.
//!
//! Artifacts become durable only once `ObjectStore::upload` returns `Ok`.

pub mod s3;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::backup::job::COMPRESSED_SUFFIX;
use crate::errors::Result;

pub use s3::S3ObjectStore;

pub const GZIP_CONTENT_TYPE: &str = "application/gzip";
pub const SQL_CONTENT_TYPE: &str = "application/sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads with server-side encryption. Never retries.
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()>;

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()>;

    /// Every object under `prefix`, across all result pages.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn delete(&self, remote_key: &str) -> Result<()>;
}

/// Content type follows the artifact's compression state, which the key suffix encodes.
pub fn content_type_for(remote_key: &str) -> &'static str {
    if remote_key.ends_with(COMPRESSED_SUFFIX) || remote_key.ends_with(".gz") {
        GZIP_CONTENT_TYPE
    } else {
        SQL_CONTENT_TYPE
    }
}
