// datastore-backup/src/utils/staging.rs
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Local files owned by one processing step. Every tracked path is removed
/// when the guard drops, on success and on every error path alike.
#[derive(Debug, Default)]
pub struct StagedFiles {
    paths: Vec<PathBuf>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_if_present(path);
        }
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed staged file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
    }
}
