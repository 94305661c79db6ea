// datastore-backup/src/backup/db_dump.rs
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::job::SCHEMA_ARTIFACT;
use crate::config::{BackupConfig, ConnectionConfig};
use crate::errors::{AppError, Result};
use crate::restore::db_restore;
use crate::utils::find_executable;
use crate::utils::process::run_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpScope {
    SchemaOnly,
    DataOnly,
    SchemaAndData,
}

/// What one pg_dump invocation should capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    pub scope: DumpScope,
    pub table: Option<String>,
    /// Emit `DROP ... IF EXISTS` ahead of each object.
    pub clean: bool,
}

impl DumpOptions {
    pub fn schema_only() -> Self {
        Self {
            scope: DumpScope::SchemaOnly,
            table: None,
            clean: false,
        }
    }

    /// Rows of one table; the DDL comes from a sibling schema artifact.
    pub fn table_data(table: &str) -> Self {
        Self {
            scope: DumpScope::DataOnly,
            table: Some(table.to_string()),
            clean: false,
        }
    }

    /// DDL plus rows of one table, restorable on its own.
    pub fn standalone_table(table: &str) -> Self {
        Self {
            scope: DumpScope::SchemaAndData,
            table: Some(table.to_string()),
            clean: true,
        }
    }

    pub fn label(&self) -> &str {
        self.table.as_deref().unwrap_or(SCHEMA_ARTIFACT)
    }

    pub fn file_name(&self) -> String {
        format!("{}.sql", self.label())
    }
}

/// The I/O boundary around the database engine's external tools.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DumpExecutor: Send + Sync {
    /// Writes a plain-text SQL dump described by `options` to `output`.
    async fn dump(&self, conn: &ConnectionConfig, options: &DumpOptions, output: &Path) -> Result<()>;

    /// Applies a plain-text SQL file to the database.
    async fn apply(&self, conn: &ConnectionConfig, sql_file: &Path) -> Result<()>;
}

/// `pg_dump` / `psql` backed executor.
#[derive(Debug, Clone)]
pub struct PgToolsExecutor {
    pg_dump_path: Option<PathBuf>,
    psql_path: Option<PathBuf>,
    dump_timeout: Duration,
    restore_timeout: Duration,
}

impl PgToolsExecutor {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            pg_dump_path: config.pg_dump_path.clone(),
            psql_path: config.psql_path.clone(),
            dump_timeout: config.dump_timeout,
            restore_timeout: config.restore_timeout,
        }
    }
}

fn locate(tool: &str, configured: Option<&PathBuf>) -> Result<PathBuf> {
    find_executable(tool, configured).map_err(|e| AppError::Command {
        tool: tool.to_string(),
        stderr: e.to_string(),
    })
}

pub fn pg_dump_args(conn: &ConnectionConfig, options: &DumpOptions, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--host".into(),
        conn.host.clone().into(),
        "--port".into(),
        conn.port.to_string().into(),
        "--username".into(),
        conn.user.clone().into(),
        "--dbname".into(),
        conn.database.clone().into(),
        "--no-password".into(),
        "--format=plain".into(),
        "--no-owner".into(),
        "--no-privileges".into(),
    ];
    match options.scope {
        DumpScope::SchemaOnly => args.push("--schema-only".into()),
        DumpScope::DataOnly => args.push("--data-only".into()),
        DumpScope::SchemaAndData => {}
    }
    if options.clean {
        args.push("--clean".into());
        args.push("--if-exists".into());
    }
    if let Some(table) = &options.table {
        args.push("--table".into());
        args.push(table.clone().into());
    }
    args.push("--file".into());
    args.push(output.as_os_str().to_os_string());
    args
}

#[async_trait]
impl DumpExecutor for PgToolsExecutor {
    async fn dump(&self, conn: &ConnectionConfig, options: &DumpOptions, output: &Path) -> Result<()> {
        let pg_dump = locate("pg_dump", self.pg_dump_path.as_ref())?;
        let mut cmd = Command::new(&pg_dump);
        cmd.args(pg_dump_args(conn, options, output))
            .env("PGPASSWORD", &conn.password);

        debug!("Running {} for {}", pg_dump.display(), options.label());
        run_with_timeout(cmd, "pg_dump", self.dump_timeout).await?;
        Ok(())
    }

    async fn apply(&self, conn: &ConnectionConfig, sql_file: &Path) -> Result<()> {
        let psql = locate("psql", self.psql_path.as_ref())?;
        db_restore::execute_sql_file_with_psql(&psql, conn, sql_file, self.restore_timeout).await
    }
}

/// Produces one local SQL file per call, never leaving a partial file behind.
#[derive(Clone)]
pub struct DumpRunner {
    executor: Arc<dyn DumpExecutor>,
}

impl DumpRunner {
    pub fn new(executor: Arc<dyn DumpExecutor>) -> Self {
        Self { executor }
    }

    pub async fn dump(
        &self,
        conn: &ConnectionConfig,
        options: &DumpOptions,
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        let output = staging_dir.join(options.file_name());
        info!("Dumping {} to {}", options.label(), output.display());

        let outcome = self.executor.dump(conn, options, &output).await;
        if let Err(e) = outcome {
            discard_partial(&output);
            return Err(e.into_dump_failure(options.label()));
        }

        if !output.is_file() {
            return Err(AppError::DumpFailed {
                target: options.label().to_string(),
                timed_out: false,
                diagnostic: format!("dump reported success but {} was not written", output.display()),
            });
        }
        Ok(output)
    }
}

fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial dump {}: {}", path.display(), e);
        }
    }
}
