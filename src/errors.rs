use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Raised before any dump is attempted; aborts the whole job.
    #[error("Invalid database connection configuration: {0}")]
    ConnectionConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Command {tool} failed: {stderr}")]
    Command { tool: String, stderr: String },

    #[error("Command {tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("Dump of {target} failed{}: {diagnostic}", timeout_tag(.timed_out))]
    DumpFailed {
        target: String,
        timed_out: bool,
        diagnostic: String,
    },

    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Retention sweep failed: {0}")]
    RetentionSweep(String),

    #[error("Restore download of {key} failed: {message}")]
    RestoreDownload { key: String, message: String },

    #[error("Restore decompression of {path} failed: {message}")]
    RestoreDecompress { path: String, message: String },

    #[error("Restore apply failed: {0}")]
    RestoreApply(String),

    #[error("Failure notification failed: {0}")]
    Notification(#[from] reqwest::Error),
}

impl AppError {
    /// Turns an executor error into a dump failure for `target`, keeping the
    /// timeout tag so callers can tell the two apart in logs.
    pub fn into_dump_failure(self, target: &str) -> AppError {
        match self {
            AppError::Timeout { tool, seconds } => AppError::DumpFailed {
                target: target.to_string(),
                timed_out: true,
                diagnostic: format!("{} exceeded {}s deadline", tool, seconds),
            },
            AppError::Command { stderr, .. } => AppError::DumpFailed {
                target: target.to_string(),
                timed_out: false,
                diagnostic: stderr,
            },
            already @ AppError::DumpFailed { .. } => already,
            other => AppError::DumpFailed {
                target: target.to_string(),
                timed_out: false,
                diagnostic: other.to_string(),
            },
        }
    }
}

fn timeout_tag(timed_out: &bool) -> &'static str {
    if *timed_out { " (timeout)" } else { "" }
}

pub type Result<T> = std::result::Result<T, AppError>;
