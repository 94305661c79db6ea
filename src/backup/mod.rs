pub(crate) mod compression;
pub(crate) mod db_dump;
pub(crate) mod job;
mod logic;
pub(crate) mod retention;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;
use crate::storage::ObjectStore;
use crate::utils::webhook::FailureNotifier;
use db_dump::PgToolsExecutor;
use job::{BackupKind, BackupResult};

pub use logic::BackupOrchestrator;

/// Public entry point for the backup process.
///
/// `table` is required for `BackupKind::SingleTable` and ignored otherwise.
/// Per-artifact failures come back inside the `BackupResult`; only a job that
/// cannot start at all is an `Err`.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    store: Arc<dyn ObjectStore>,
    kind: BackupKind,
    table: Option<&str>,
) -> Result<BackupResult> {
    let executor = Arc::new(PgToolsExecutor::from_config(&app_config.backup));
    let mut orchestrator = BackupOrchestrator::new(
        app_config.backup.clone(),
        app_config.storage.prefix.clone(),
        store,
        executor,
    );
    if let Some(url) = &app_config.backup.failure_webhook_url {
        match FailureNotifier::new(url.clone()) {
            Ok(notifier) => orchestrator = orchestrator.with_notifier(notifier),
            Err(e) => warn!("Failure webhook disabled: {}", e),
        }
    }

    let result = match kind {
        BackupKind::Full => orchestrator.run_full().await,
        BackupKind::Critical => orchestrator.run_critical_only().await,
        BackupKind::SingleTable => {
            let table = table.context("A table name is required for a single-table backup")?;
            orchestrator.run_single_table(table).await
        }
    };
    result.with_context(|| format!("{} backup could not start", kind))
}
