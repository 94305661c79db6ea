// datastore-backup/src/config/mod.rs
pub mod connection;

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::backup::job::{BackupKind, SCHEMA_ARTIFACT};
use crate::backup::retention::RetentionPolicy;

pub use connection::{ConnectionConfig, resolve_connection};

const DEFAULT_PREFIX: &str = "backups/";
const DEFAULT_LOCAL_BACKUP_DIR: &str = "./backups";
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
const DEFAULT_DUMP_TIMEOUT_SECS: u64 = 600;
const DEFAULT_RESTORE_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 300;

/// Object store destination and client tuning.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Always empty or ending in `/`.
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub operation_timeout: Duration,
}

/// Per-kind retention, evaluated against the store's last-modified times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicies {
    pub full: RetentionPolicy,
    pub critical: RetentionPolicy,
    pub tables: RetentionPolicy,
}

impl Default for RetentionPolicies {
    fn default() -> Self {
        Self {
            full: RetentionPolicy { max_age_days: 30 },
            critical: RetentionPolicy { max_age_days: 14 },
            tables: RetentionPolicy { max_age_days: 7 },
        }
    }
}

impl RetentionPolicies {
    pub fn for_kind(&self, kind: BackupKind) -> RetentionPolicy {
        match kind {
            BackupKind::Full => self.full,
            BackupKind::Critical => self.critical,
            BackupKind::SingleTable => self.tables,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Raw descriptor; resolved (and validated) at job start, not here.
    pub database_url: Option<String>,
    pub local_backup_dir: PathBuf,
    pub tables_to_backup: Vec<String>,
    pub critical_tables: Vec<String>,
    pub compression_enabled: bool,
    pub compression_level: u32,
    pub retention: RetentionPolicies,
    pub dump_timeout: Duration,
    pub restore_timeout: Duration,
    pub pg_dump_path: Option<PathBuf>,
    pub psql_path: Option<PathBuf>,
    pub failure_webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backup: BackupConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Loads `.env` (if any) and reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bucket = get("BACKUP_BUCKET").context("BACKUP_BUCKET must be set")?;
        // Set but empty means the bucket root, so only an unset variable takes the default.
        let prefix = normalize_prefix(lookup("BACKUP_PREFIX").as_deref().unwrap_or(DEFAULT_PREFIX));

        let compression_level = match get("COMPRESSION_LEVEL") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|level| *level <= 9)
                .with_context(|| format!("COMPRESSION_LEVEL must be an integer 0-9, got '{}'", raw))?,
            None => DEFAULT_COMPRESSION_LEVEL,
        };
        let compression_enabled = match get("COMPRESSION_ENABLED") {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("COMPRESSION_ENABLED must be a boolean, got '{}'", raw))?,
            None => true,
        };

        let tables_to_backup =
            parse_table_list(get("TABLES_TO_BACKUP").as_deref()).context("Failed to parse TABLES_TO_BACKUP")?;
        if let Some(conflict) = table_set_conflict(&tables_to_backup, true) {
            anyhow::bail!("Invalid TABLES_TO_BACKUP: {}", conflict);
        }

        let backup = BackupConfig {
            database_url: lookup("DATABASE_URL"),
            local_backup_dir: get("LOCAL_BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_BACKUP_DIR)),
            tables_to_backup,
            critical_tables: parse_table_list(get("CRITICAL_TABLES").as_deref())
                .context("Failed to parse CRITICAL_TABLES")?,
            compression_enabled,
            compression_level,
            retention: parse_retention_policies(get("RETENTION_POLICIES").as_deref())
                .context("Failed to parse RETENTION_POLICIES")?,
            dump_timeout: parse_secs(get("DUMP_TIMEOUT_SECS"), DEFAULT_DUMP_TIMEOUT_SECS, "DUMP_TIMEOUT_SECS")?,
            restore_timeout: parse_secs(
                get("RESTORE_TIMEOUT_SECS"),
                DEFAULT_RESTORE_TIMEOUT_SECS,
                "RESTORE_TIMEOUT_SECS",
            )?,
            pg_dump_path: get("PG_DUMP_PATH").map(PathBuf::from),
            psql_path: get("PSQL_PATH").map(PathBuf::from),
            failure_webhook_url: get("FAILURE_WEBHOOK_URL"),
        };

        let storage = StorageConfig {
            bucket,
            prefix,
            region: get("AWS_REGION"),
            endpoint_url: get("S3_ENDPOINT_URL"),
            operation_timeout: parse_secs(
                get("STORAGE_TIMEOUT_SECS"),
                DEFAULT_STORAGE_TIMEOUT_SECS,
                "STORAGE_TIMEOUT_SECS",
            )?,
        };

        Ok(AppConfig { backup, storage })
    }
}

/// Empty stays empty (bucket root); anything else gets exactly one trailing `/`.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_secs(raw: Option<String>, default: u64, name: &str) -> Result<Duration> {
    match raw {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .with_context(|| format!("{} must be a positive number of seconds, got '{}'", name, raw)),
        None => Ok(Duration::from_secs(default)),
    }
}

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("table name pattern is a valid regex")
    })
}

pub fn is_valid_table_name(name: &str) -> bool {
    table_name_pattern().is_match(name)
}

/// Describes why `tables` cannot share one job's key namespace: a repeated
/// entry, or (for full jobs) a table named like the schema artifact.
pub fn table_set_conflict(tables: &[String], schema_reserved: bool) -> Option<String> {
    if schema_reserved && tables.iter().any(|t| t == SCHEMA_ARTIFACT) {
        return Some(format!(
            "table {:?} collides with the schema artifact of a full backup",
            SCHEMA_ARTIFACT
        ));
    }
    let mut seen = HashSet::new();
    tables
        .iter()
        .find(|t| !seen.insert(t.as_str()))
        .map(|dup| format!("table {:?} is listed more than once", dup))
}

/// Parses an ordered table list given either as a JSON array
/// (`["shooters","shooter_images"]`) or as a comma-separated string.
fn parse_table_list(raw: Option<&str>) -> Result<Vec<String>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let tables: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).context("table list must be a JSON array of strings")?
    } else {
        raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    };

    if let Some(bad) = tables.iter().find(|t| !is_valid_table_name(t)) {
        anyhow::bail!("Invalid table name in list: {:?}", bad);
    }
    if let Some(conflict) = table_set_conflict(&tables, false) {
        anyhow::bail!("{}", conflict);
    }
    Ok(tables)
}

/// Parses `{"full": 30, "critical": 14, "tables": 7}`; missing kinds keep their defaults.
fn parse_retention_policies(raw: Option<&str>) -> Result<RetentionPolicies> {
    let mut policies = RetentionPolicies::default();
    let Some(raw) = raw else {
        return Ok(policies);
    };

    let mapping: HashMap<String, u32> =
        serde_json::from_str(raw).context("RETENTION_POLICIES must be a JSON object of day counts")?;
    for (kind, days) in mapping {
        let policy = RetentionPolicy { max_age_days: days };
        match kind.as_str() {
            "full" => policies.full = policy,
            "critical" => policies.critical = policy,
            "tables" | "single_table" => policies.tables = policy,
            other => anyhow::bail!("Unknown job kind in RETENTION_POLICIES: {}", other),
        }
    }
    Ok(policies)
}
