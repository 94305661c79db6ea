// datastore-backup/src/utils/webhook.rs
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use crate::backup::job::BackupResult;
use crate::errors::Result;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Posts failed job results to an operator webhook.
#[derive(Debug, Clone)]
pub struct FailureNotifier {
    url: String,
    client: Client,
}

impl FailureNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("datastore-backup/", env!("CARGO_PKG_VERSION")))
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self { url: url.into(), client })
    }

    pub async fn send(&self, result: &BackupResult) -> Result<()> {
        self.client
            .post(&self.url)
            .json(result)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Best-effort: a failed notification is logged and otherwise ignored.
    pub async fn notify_failure(&self, result: &BackupResult) {
        if result.success {
            return;
        }
        match self.send(result).await {
            Ok(()) => info!(
                "Failure notification sent for {} backup {}",
                result.kind, result.timestamp
            ),
            Err(e) => warn!(
                "Could not deliver failure notification for {} backup {}: {}",
                result.kind, result.timestamp, e
            ),
        }
    }
}
