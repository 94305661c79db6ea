pub(crate) mod db_restore;
mod logic;
pub(crate) mod verification;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::backup::db_dump::PgToolsExecutor;
use crate::config::{AppConfig, resolve_connection};
use crate::storage::ObjectStore;

pub use logic::Restorer;

/// Public entry point for the restore process.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    store: Arc<dyn ObjectStore>,
    remote_key: &str,
) -> Result<()> {
    let conn = resolve_connection(app_config.backup.database_url.as_deref().unwrap_or(""))?;
    let executor = Arc::new(PgToolsExecutor::from_config(&app_config.backup));
    let restorer = Restorer::new(store, executor, app_config.backup.local_backup_dir.clone());
    restorer
        .restore(remote_key, &conn)
        .await
        .with_context(|| format!("Restore of {} failed", remote_key))
}

/// Prints the row count and checksum of `table`.
pub async fn run_verify_flow(app_config: &AppConfig, table: &str) -> Result<()> {
    let conn = resolve_connection(app_config.backup.database_url.as_deref().unwrap_or(""))?;
    let fingerprint = verification::table_fingerprint(&conn, table)
        .await
        .with_context(|| format!("Failed to fingerprint table {}", table))?;
    println!("{}", fingerprint);
    Ok(())
}
