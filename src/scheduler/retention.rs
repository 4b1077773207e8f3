//! Retention cycle for deleting old snapshots.

use crate::db::{DbError, SnapshotStore};

use chrono::{DateTime, Days, Utc};
use std::sync::Arc;

/// Deletes snapshots that fall outside the retention horizon.
pub struct RetentionCycle {
    store: Arc<dyn SnapshotStore>,
}

impl RetentionCycle {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Delete every snapshot older than `days` calendar days before now.
    pub fn purge_older_than(&self, days: u32) -> Result<usize, DbError> {
        self.purge_older_than_at(days, Utc::now())
    }

    /// Delete every snapshot older than `days` calendar days before `now`.
    pub fn purge_older_than_at(&self, days: u32, now: DateTime<Utc>) -> Result<usize, DbError> {
        let cutoff = now
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store.delete_snapshots_before(cutoff)
    }

    /// Run one retention pass, logging the outcome. Never fails.
    pub fn run(&self, days: u32) {
        tracing::info!("RetentionCycle: Purging snapshots older than {} days", days);

        match self.purge_older_than(days) {
            Ok(deleted) => {
                tracing::info!("RetentionCycle: Deleted {} old snapshots", deleted);
            }
            Err(e) => {
                tracing::error!("RetentionCycle: Failed to delete old snapshots: {}", e);
            }
        }
    }
}
