// datastore-backup/src/backup/job.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// `YYYYMMDD_HHMMSS`, shared by every artifact of one job.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const COMPRESSED_SUFFIX: &str = ".sql.gz";
pub const PLAIN_SUFFIX: &str = ".sql";

/// Artifact name of a full job's schema dump; never usable as a table name there.
pub const SCHEMA_ARTIFACT: &str = "schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    SingleTable,
    Critical,
}

impl BackupKind {
    /// Namespace segment under the configured prefix.
    pub fn namespace(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Critical => "critical",
            BackupKind::SingleTable => "tables",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// One orchestrator invocation. The timestamp is fixed at construction.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub kind: BackupKind,
    pub timestamp: String,
    pub table_set: Vec<String>,
    prefix: String,
}

impl BackupJob {
    pub fn new(kind: BackupKind, prefix: &str, table_set: Vec<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp: started_at.format(TIMESTAMP_FORMAT).to_string(),
            table_set,
            prefix: prefix.to_string(),
        }
    }

    /// Remote key for one unit of work. `table == None` is the schema dump.
    ///
    /// ```text
    /// <prefix>full/<ts>/schema.sql.gz
    /// <prefix>full/<ts>/<table>.sql.gz
    /// <prefix>critical/<ts>/<table>.sql.gz
    /// <prefix>tables/<table>/<ts>.sql.gz
    /// ```
    pub fn remote_key(&self, table: Option<&str>, compressed: bool) -> String {
        let suffix = if compressed { COMPRESSED_SUFFIX } else { PLAIN_SUFFIX };
        let name = table.unwrap_or(SCHEMA_ARTIFACT);
        match self.kind {
            BackupKind::SingleTable => {
                format!("{}tables/{}/{}{}", self.prefix, name, self.timestamp, suffix)
            }
            BackupKind::Full | BackupKind::Critical => format!(
                "{}{}/{}/{}{}",
                self.prefix,
                self.kind.namespace(),
                self.timestamp,
                name,
                suffix
            ),
        }
    }

    /// Prefix the retention sweep for this job runs over.
    pub fn retention_prefix(&self) -> String {
        match (self.kind, self.table_set.first()) {
            (BackupKind::SingleTable, Some(table)) => format!("{}tables/{}/", self.prefix, table),
            _ => format!("{}{}/", self.prefix, self.kind.namespace()),
        }
    }
}

/// A dumped file on its way to the object store.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    /// `None` denotes the schema-only dump.
    pub table: Option<String>,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub compressed: bool,
    pub size_bytes: u64,
}

impl BackupArtifact {
    pub fn label(&self) -> &str {
        self.table.as_deref().unwrap_or("schema")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupResult {
    pub kind: BackupKind,
    pub timestamp: String,
    pub success: bool,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
}

impl BackupResult {
    /// Derives `success` from the error list; there is no other way to build one.
    pub fn finalize(job: &BackupJob, artifacts: Vec<String>, errors: Vec<String>) -> Self {
        Self {
            kind: job.kind,
            timestamp: job.timestamp.clone(),
            success: errors.is_empty(),
            artifacts,
            errors,
        }
    }
}
