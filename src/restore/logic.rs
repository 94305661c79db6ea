// datastore-backup/src/restore/logic.rs
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::backup::compression::decompress_file;
use crate::backup::db_dump::DumpExecutor;
use crate::backup::job::COMPRESSED_SUFFIX;
use crate::config::ConnectionConfig;
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;
use crate::utils::staging::StagedFiles;

/// Downloads one archived artifact and applies it to a database.
///
/// Restore is all-or-nothing: the first failing step ends the call. Every
/// local file it created is gone by the time it returns, whatever the outcome.
pub struct Restorer {
    store: Arc<dyn ObjectStore>,
    executor: Arc<dyn DumpExecutor>,
    staging_dir: PathBuf,
}

impl Restorer {
    pub fn new(store: Arc<dyn ObjectStore>, executor: Arc<dyn DumpExecutor>, staging_dir: PathBuf) -> Self {
        Self {
            store,
            executor,
            staging_dir,
        }
    }

    pub async fn restore(&self, remote_key: &str, conn: &ConnectionConfig) -> Result<()> {
        info!("Restoring {} into {}@{}/{}", remote_key, conn.user, conn.host, conn.database);
        let outcome = self.restore_inner(remote_key, conn).await;
        match &outcome {
            Ok(()) => info!("Restore of {} completed", remote_key),
            Err(e) => error!("Restore of {} failed: {}", remote_key, e),
        }
        outcome
    }

    async fn restore_inner(&self, remote_key: &str, conn: &ConnectionConfig) -> Result<()> {
        let download_error = |message: String| AppError::RestoreDownload {
            key: remote_key.to_string(),
            message,
        };

        let file_name = remote_key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| download_error("remote key has no file name".to_string()))?;

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| download_error(format!("cannot create {}: {}", self.staging_dir.display(), e)))?;
        let workspace = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&self.staging_dir)
            .map_err(|e| download_error(format!("cannot create restore workspace: {}", e)))?;
        let mut staged = StagedFiles::new();

        let archive = workspace.path().join(file_name);
        staged.track(&archive);
        self.store
            .download(remote_key, &archive)
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let sql_file = if remote_key.ends_with(COMPRESSED_SUFFIX) {
            // Track the output before it exists so a half-written file is covered too.
            staged.track(archive.with_extension(""));
            let source = archive.clone();
            tokio::task::spawn_blocking(move || decompress_file(&source))
                .await
                .map_err(|e| AppError::RestoreDecompress {
                    path: archive.display().to_string(),
                    message: e.to_string(),
                })?
                .map_err(|e| AppError::RestoreDecompress {
                    path: archive.display().to_string(),
                    message: e.to_string(),
                })?
        } else {
            archive.clone()
        };

        self.executor
            .apply(conn, &sql_file)
            .await
            .map_err(|e| match e {
                AppError::RestoreApply(_) => e,
                other => AppError::RestoreApply(other.to_string()),
            })?;

        drop(staged);
        workspace.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::db_dump::MockDumpExecutor;
    use crate::storage::memory::MemoryObjectStore;
    use chrono::Utc;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use std::path::Path;

    const SQL: &[u8] = b"CREATE TABLE shooters (id int);\nINSERT INTO shooters VALUES (30);\n";

    fn conn() -> ConnectionConfig {
        ConnectionConfig {
            host: "localhost".into(),
            port: 5432,
            user: "hoops".into(),
            password: "pw".into(),
            database: "shots".into(),
        }
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn staging_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut entries| entries.next().is_none()).unwrap_or(true)
    }

    fn restorer(store: Arc<MemoryObjectStore>, executor: MockDumpExecutor, staging: &Path) -> Restorer {
        Restorer::new(store, Arc::new(executor), staging.to_path_buf())
    }

    #[tokio::test]
    async fn compressed_artifact_is_inflated_and_applied() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        let key = "backups/critical/20240101_000000/shooters.sql.gz";
        store.insert(key, &gzip(SQL), Utc::now());

        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().times(1).returning(|_, sql_file| {
            assert!(sql_file.to_string_lossy().ends_with("shooters.sql"));
            assert_eq!(std::fs::read(sql_file)?, SQL);
            Ok(())
        });

        restorer(store, executor, staging.path()).restore(key, &conn()).await?;
        assert!(staging_is_empty(staging.path()));
        Ok(())
    }

    #[tokio::test]
    async fn plain_artifact_is_applied_as_is() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        let key = "backups/tables/shooters/20240101_000000.sql";
        store.insert(key, SQL, Utc::now());

        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().times(1).returning(|_, sql_file| {
            assert_eq!(std::fs::read(sql_file)?, SQL);
            Ok(())
        });

        restorer(store, executor, staging.path()).restore(key, &conn()).await?;
        assert!(staging_is_empty(staging.path()));
        Ok(())
    }

    #[tokio::test]
    async fn download_failure_cleans_up_partial_file() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_downloads();
        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().never();

        let err = restorer(store, executor, staging.path())
            .restore("backups/full/20240101_000000/schema.sql.gz", &conn())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RestoreDownload { .. }));
        assert!(staging_is_empty(staging.path()));
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_is_a_download_failure() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().never();

        let err = restorer(Arc::new(MemoryObjectStore::new()), executor, staging.path())
            .restore("backups/full/20240101_000000/nope.sql.gz", &conn())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RestoreDownload { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_archive_is_a_decompress_failure() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        let key = "backups/full/20240101_000000/shooters.sql.gz";
        store.insert(key, b"not gzip at all", Utc::now());
        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().never();

        let err = restorer(store, executor, staging.path())
            .restore(key, &conn())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RestoreDecompress { .. }));
        assert!(staging_is_empty(staging.path()));
        Ok(())
    }

    #[tokio::test]
    async fn apply_failure_removes_downloaded_and_inflated_files() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = Arc::new(MemoryObjectStore::new());
        let key = "backups/full/20240101_000000/shooters.sql.gz";
        store.insert(key, &gzip(SQL), Utc::now());

        let mut executor = MockDumpExecutor::new();
        executor.expect_apply().times(1).returning(|_, _| {
            Err(AppError::Command {
                tool: "psql".into(),
                stderr: "ERROR:  relation \"shooters\" already exists".into(),
            })
        });

        let err = restorer(store, executor, staging.path())
            .restore(key, &conn())
            .await
            .unwrap_err();

        match err {
            AppError::RestoreApply(message) => assert!(message.contains("already exists")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(staging_is_empty(staging.path()));
        Ok(())
    }
}
