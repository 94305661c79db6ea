// datastore-backup/src/restore/db_restore.rs
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

use crate::config::ConnectionConfig;
use crate::errors::{AppError, Result};
use crate::utils::process::run_with_timeout;

pub fn psql_args(conn: &ConnectionConfig, sql_file_path: &Path) -> Vec<OsString> {
    vec![
        "-X".into(), // Do not read psqlrc
        "-q".into(),
        "-v".into(),
        "ON_ERROR_STOP=1".into(),
        "--single-transaction".into(),
        "--no-password".into(),
        "--host".into(),
        conn.host.clone().into(),
        "--port".into(),
        conn.port.to_string().into(),
        "--username".into(),
        conn.user.clone().into(),
        "--dbname".into(),
        conn.database.clone().into(),
        "-f".into(),
        sql_file_path.as_os_str().to_os_string(),
    ]
}

/// Executes a SQL file against the target database with `psql`.
///
/// The whole file runs in one transaction and stops at the first error, so a
/// failed apply leaves the live database as it was.
pub async fn execute_sql_file_with_psql(
    psql_path: &Path,
    conn: &ConnectionConfig,
    sql_file_path: &Path,
    limit: Duration,
) -> Result<()> {
    if !sql_file_path.is_file() {
        return Err(AppError::RestoreApply(format!(
            "SQL file not found: {}",
            sql_file_path.display()
        )));
    }

    info!(
        "Applying {} to {}@{}:{}/{}",
        sql_file_path.display(),
        conn.user,
        conn.host,
        conn.port,
        conn.database
    );

    let mut cmd = Command::new(psql_path);
    cmd.args(psql_args(conn, sql_file_path))
        .env("PGPASSWORD", &conn.password);
    run_with_timeout(cmd, "psql", limit).await?;

    info!("Successfully applied {}", sql_file_path.display());
    Ok(())
}
