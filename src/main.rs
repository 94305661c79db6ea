//! Database Backup/Restore Tool
//!
//! Provides CLI interface for backup, restore and verification of a
//! PostgreSQL database against an S3-compatible bucket.

// datastore-backup/src/main.rs
mod backup;
mod config;
mod errors;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use backup::job::{BackupKind, BackupResult};
use config::AppConfig;
use storage::{ObjectStore, S3ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operation {
    Backup(BackupKind, Option<String>),
    Restore(String),
    Verify(String),
}

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    utils::logging::init();
    match run_app().await {
        Ok(true) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("❌ Operation finished with errors.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:?}", e);
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<bool> {
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    let args: Vec<String> = env::args().skip(1).collect();
    let operation = if args.is_empty() {
        let choice = prompt_choice()?;
        let words: Vec<String> = choice.split_whitespace().map(str::to_string).collect();
        parse_operation(&words)?
    } else {
        parse_operation(&args)?
    };

    let s3_store = S3ObjectStore::new(app_config.storage.clone());
    info!("Using bucket {} with prefix {:?}", s3_store.bucket(), app_config.storage.prefix);
    let store: Arc<dyn ObjectStore> = Arc::new(s3_store);

    match operation {
        Operation::Backup(kind, table) => {
            println!("🚀 Starting {} backup...", kind);
            let result = backup::run_backup_flow(&app_config, store, kind, table.as_deref())
                .await
                .context("Backup process failed")?;
            report(&result);
            Ok(result.success)
        }
        Operation::Restore(key) => {
            println!("🔄 Restoring {}...", key);
            restore::run_restore_flow(&app_config, store, &key)
                .await
                .context("Restore process failed")?;
            Ok(true)
        }
        Operation::Verify(table) => {
            restore::run_verify_flow(&app_config, &table)
                .await
                .context("Verification failed")?;
            Ok(true)
        }
    }
}

fn report(result: &BackupResult) {
    info!(
        "{} backup {}: success={}, {} artifacts, {} errors",
        result.kind,
        result.timestamp,
        result.success,
        result.artifacts.len(),
        result.errors.len()
    );
    for key in &result.artifacts {
        println!("  uploaded {}", key);
    }
    for message in &result.errors {
        eprintln!("  {}", message);
    }
}

fn parse_operation(args: &[String]) -> Result<Operation> {
    let command = args.first().map(|s| s.trim()).unwrap_or_default();
    let operand = args.get(1).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    match command {
        "1" | "full" => Ok(Operation::Backup(BackupKind::Full, None)),
        "2" | "critical" => Ok(Operation::Backup(BackupKind::Critical, None)),
        "3" | "table" => {
            let table = operand.context("Usage: table <name>")?;
            Ok(Operation::Backup(BackupKind::SingleTable, Some(table)))
        }
        "4" | "restore" => Ok(Operation::Restore(operand.context("Usage: restore <remote-key>")?)),
        "5" | "verify" => Ok(Operation::Verify(operand.context("Usage: verify <table>")?)),
        other => {
            println!("❌ Invalid choice. Please enter 'full', 'critical', 'table <name>', 'restore <key>' or 'verify <table>'.");
            anyhow::bail!("Invalid operation choice: {:?}", other)
        }
    }
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String, including any operand
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Full backup (or type 'full')");
    println!("2. Critical tables backup (or type 'critical')");
    println!("3. Single table backup (type 'table <name>')");
    println!("4. Restore an artifact (type 'restore <remote-key>')");
    println!("5. Verify a table (type 'verify <table>')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
