// datastore-backup/src/backup/logic.rs
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::compression::Compressor;
use super::db_dump::{DumpExecutor, DumpOptions, DumpRunner};
use super::job::{BackupArtifact, BackupJob, BackupKind, BackupResult};
use super::retention::RetentionSweeper;
use crate::config::{BackupConfig, ConnectionConfig, is_valid_table_name, resolve_connection, table_set_conflict};
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;
use crate::utils::staging::StagedFiles;
use crate::utils::webhook::FailureNotifier;

/// Drives one job: resolve the connection, then Dump -> Compress -> Upload ->
/// cleanup for every unit of work, strictly one after another.
///
/// A failing unit is recorded and the loop moves on. Only an unusable
/// connection descriptor or a table set whose keys would collide aborts the
/// job, and it does so before any dump runs.
pub struct BackupOrchestrator {
    config: BackupConfig,
    prefix: String,
    store: Arc<dyn ObjectStore>,
    dumper: DumpRunner,
    compressor: Compressor,
    notifier: Option<FailureNotifier>,
}

impl BackupOrchestrator {
    pub fn new(
        config: BackupConfig,
        prefix: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        executor: Arc<dyn DumpExecutor>,
    ) -> Self {
        let compressor = Compressor::new(config.compression_enabled, config.compression_level);
        Self {
            config,
            prefix: prefix.into(),
            store,
            dumper: DumpRunner::new(executor),
            compressor,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: FailureNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn run_full(&self) -> Result<BackupResult> {
        self.run(BackupKind::Full, self.config.tables_to_backup.clone()).await
    }

    /// Same pipeline restricted to the configured critical tables.
    pub async fn run_critical_only(&self) -> Result<BackupResult> {
        self.run(BackupKind::Critical, self.config.critical_tables.clone()).await
    }

    pub async fn run_single_table(&self, table: &str) -> Result<BackupResult> {
        if !is_valid_table_name(table) {
            return Err(AppError::Config(format!("invalid table name: {:?}", table)));
        }
        self.run(BackupKind::SingleTable, vec![table.to_string()]).await
    }

    async fn run(&self, kind: BackupKind, tables: Vec<String>) -> Result<BackupResult> {
        let conn = resolve_connection(self.config.database_url.as_deref().unwrap_or(""))?;
        if let Some(conflict) = table_set_conflict(&tables, kind == BackupKind::Full) {
            return Err(AppError::Config(format!("{} backup: {}", kind, conflict)));
        }

        let job = BackupJob::new(kind, &self.prefix, tables, Utc::now());
        info!(
            "Starting {} backup {} of {}@{}/{} ({} tables)",
            job.kind,
            job.timestamp,
            conn.user,
            conn.host,
            conn.database,
            job.table_set.len()
        );

        let mut artifacts = Vec::new();
        let mut errors = Vec::new();

        match self.create_job_staging(&job) {
            Ok(staging) => {
                for options in work_units(&job) {
                    match self.process_unit(&job, &conn, &options, staging.path()).await {
                        Ok(remote_key) => artifacts.push(remote_key),
                        Err(e) => {
                            error!("Failed to backup {}: {}", options.label(), e);
                            errors.push(format!("Failed to backup {}", options.label()));
                        }
                    }
                }
                if let Err(e) = staging.close() {
                    warn!("Failed to remove staging directory for job {}: {}", job.timestamp, e);
                }
            }
            Err(e) => {
                error!("Cannot stage {} backup {}: {}", job.kind, job.timestamp, e);
                errors.push(format!("Failed to prepare staging directory: {}", e));
            }
        }

        let result = BackupResult::finalize(&job, artifacts, errors);
        self.finish(&job, &result).await;
        Ok(result)
    }

    fn create_job_staging(&self, job: &BackupJob) -> Result<TempDir> {
        std::fs::create_dir_all(&self.config.local_backup_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!("{}_{}_", job.kind, job.timestamp))
            .tempdir_in(&self.config.local_backup_dir)?;
        Ok(staging)
    }

    /// One artifact end to end. Its local files are gone when this returns.
    async fn process_unit(
        &self,
        job: &BackupJob,
        conn: &ConnectionConfig,
        options: &DumpOptions,
        staging_dir: &Path,
    ) -> Result<String> {
        let mut staged = StagedFiles::new();

        let dump_path = self.dumper.dump(conn, options, staging_dir).await?;
        staged.track(&dump_path);
        let mut artifact = BackupArtifact {
            table: options.table.clone(),
            remote_key: job.remote_key(options.table.as_deref(), false),
            size_bytes: tokio::fs::metadata(&dump_path).await?.len(),
            local_path: dump_path,
            compressed: false,
        };

        let outcome = self.compressor.compress(&artifact.local_path).await;
        if outcome.compressed {
            staged.track(&outcome.path);
            artifact.local_path = outcome.path;
            artifact.compressed = true;
            artifact.remote_key = job.remote_key(options.table.as_deref(), true);
            artifact.size_bytes = tokio::fs::metadata(&artifact.local_path).await?.len();
        }

        self.store.upload(&artifact.local_path, &artifact.remote_key).await?;
        info!(
            "Backed up {} -> {} ({} bytes, compressed: {})",
            artifact.label(),
            artifact.remote_key,
            artifact.size_bytes,
            artifact.compressed
        );
        debug!("Releasing {} staged files for {}", staged.paths().len(), artifact.label());
        Ok(artifact.remote_key)
    }

    async fn finish(&self, job: &BackupJob, result: &BackupResult) {
        if result.success {
            info!(
                "{} backup {} succeeded with {} artifacts",
                result.kind,
                result.timestamp,
                result.artifacts.len()
            );
            let policy = self.config.retention.for_kind(job.kind);
            RetentionSweeper::new(self.store.as_ref())
                .sweep(&job.retention_prefix(), policy)
                .await;
        } else {
            error!(
                "{} backup {} failed: {} errors, {} artifacts uploaded",
                result.kind,
                result.timestamp,
                result.errors.len(),
                result.artifacts.len()
            );
            if let Some(notifier) = &self.notifier {
                notifier.notify_failure(result).await;
            }
        }
    }
}

/// Schema first (full jobs only), then tables in configured order.
fn work_units(job: &BackupJob) -> Vec<DumpOptions> {
    match job.kind {
        BackupKind::Full => std::iter::once(DumpOptions::schema_only())
            .chain(job.table_set.iter().map(|t| DumpOptions::table_data(t)))
            .collect(),
        BackupKind::Critical | BackupKind::SingleTable => job
            .table_set
            .iter()
            .map(|t| DumpOptions::standalone_table(t))
            .collect(),
    }
}
