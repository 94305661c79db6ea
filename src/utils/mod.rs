pub mod logging;
pub mod process;
pub mod staging;
pub mod webhook;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Returns `configured` if set, otherwise looks `tool` up on `PATH`.
pub fn find_executable(tool: &str, configured: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.clone());
    }
    which(tool).with_context(|| {
        format!(
            "{} executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.",
            tool
        )
    })
}
