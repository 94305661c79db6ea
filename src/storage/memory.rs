// In-memory object store for tests: records uploads and injects failures.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ObjectInfo, ObjectStore, content_type_for};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_downloads: AtomicBool,
    fail_list: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, body: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: content_type_for(key),
                last_modified,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Uploads to any key ending in `suffix` fail.
    pub fn fail_uploads_ending_with(&self, suffix: &str) {
        self.failing_uploads.lock().unwrap().insert(suffix.to_string());
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_downloads(&self) {
        self.fail_downloads.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<()> {
        let rejected = self
            .failing_uploads
            .lock()
            .unwrap()
            .iter()
            .any(|suffix| remote_key.ends_with(suffix.as_str()));
        if rejected {
            return Err(AppError::Upload {
                key: remote_key.to_string(),
                message: "simulated network failure".into(),
            });
        }
        let body = tokio::fs::read(local_path).await?;
        self.insert(remote_key, &body, Utc::now());
        Ok(())
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<()> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            // Leave a partial file behind, as an interrupted transfer would.
            tokio::fs::write(local_path, b"partial").await?;
            return Err(AppError::Storage(format!("get {}: simulated failure", remote_key)));
        }
        let object = self
            .get(remote_key)
            .ok_or_else(|| AppError::Storage(format!("get {}: NoSuchKey", remote_key)))?;
        tokio::fs::write(local_path, &object.body).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("list {}: simulated failure", prefix)));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn delete(&self, remote_key: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(remote_key) {
            return Err(AppError::Storage(format!("delete {}: simulated failure", remote_key)));
        }
        self.objects.lock().unwrap().remove(remote_key);
        Ok(())
    }
}
