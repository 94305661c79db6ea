// datastore-backup/src/backup/retention.rs
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
}

impl RetentionPolicy {
    /// `None` when the policy reaches past the earliest representable time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        TimeDelta::try_days(i64::from(self.max_age_days)).and_then(|age| now.checked_sub_signed(age))
    }

    /// Strictly older than the cutoff. An object exactly at the cutoff is kept,
    /// and nothing expires when there is no cutoff.
    pub fn is_expired(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.cutoff(now).is_some_and(|cutoff| last_modified < cutoff)
    }
}

/// Best-effort deletion of expired artifacts under a prefix.
pub struct RetentionSweeper<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> RetentionSweeper<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub async fn sweep(&self, prefix: &str, policy: RetentionPolicy) -> usize {
        self.sweep_at(prefix, policy, Utc::now()).await
    }

    /// Returns how many objects were actually deleted. Neither a listing
    /// failure nor a failed delete is propagated.
    pub async fn sweep_at(&self, prefix: &str, policy: RetentionPolicy, now: DateTime<Utc>) -> usize {
        let objects = match self.store.list(prefix).await {
            Ok(objects) => objects,
            Err(e) => {
                let err = AppError::RetentionSweep(format!("listing {}: {}", prefix, e));
                warn!("{}", err);
                return 0;
            }
        };

        let Some(cutoff) = policy.cutoff(now) else {
            info!(
                "Retention sweep of {} skipped: {} day policy has no representable cutoff",
                prefix, policy.max_age_days
            );
            return 0;
        };
        let mut deleted = 0;
        let mut freed_bytes = 0u64;
        for object in objects.iter().filter(|o| policy.is_expired(o.last_modified, now)) {
            match self.store.delete(&object.key).await {
                Ok(()) => {
                    info!(
                        "Retention: deleted {} (last modified {}, cutoff {})",
                        object.key, object.last_modified, cutoff
                    );
                    deleted += 1;
                    freed_bytes += object.size;
                }
                Err(e) => warn!("Retention: could not delete {}: {}", object.key, e),
            }
        }

        info!(
            "Retention sweep of {} ({} day policy): {} of {} objects deleted, {} bytes freed",
            prefix,
            policy.max_age_days,
            deleted,
            objects.len(),
            freed_bytes
        );
        deleted
    }
}
