//! Retention Sweeper - trims audit events past the retention window
//!
//! Deletes run in bounded batches so no single statement holds the table
//! for long; the sweep loops until a batch comes back short.

use chrono::{DateTime, Utc};
use tranche_core::timestamp;

use crate::config::RetentionConfig;
use crate::error::AuditResult;
use crate::store::AuditStore;

/// Outcome of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
    pub batches: u32,
}

pub struct RetentionSweeper {
    store: AuditStore,
    config: RetentionConfig,
}

impl RetentionSweeper {
    pub fn new(store: AuditStore, config: RetentionConfig) -> AuditResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Delete everything older than `now - retention_window`
    pub async fn sweep(&self) -> AuditResult<SweepReport> {
        let cutoff = timestamp::now() - self.config.retention_window();
        self.sweep_before(cutoff).await
    }

    /// Delete everything older than an explicit cutoff
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> AuditResult<SweepReport> {
        let limit = self.config.batch_limit;
        let mut report = SweepReport {
            cutoff,
            deleted: 0,
            batches: 0,
        };

        loop {
            let count = self.store.delete_older_than(&cutoff, limit).await?;
            report.deleted += count;
            report.batches += 1;

            tracing::debug!(batch = report.batches, count, "Retention batch deleted");

            if count < u64::from(limit) {
                break;
            }
        }

        tracing::info!(
            cutoff = %timestamp::encode(&cutoff),
            deleted = report.deleted,
            batches = report.batches,
            "Retention sweep finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditRecord;
    use std::time::Duration;

    async fn seed(store: &AuditStore, prefix: &str, n: usize) {
        for i in 0..n {
            let record = AuditRecord::new("transfer.created", "pending_transfer", format!("{prefix}-{i}"), "maker");
            store.append(record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sweep_before_loops_until_short_batch() {
        let store = AuditStore::in_memory().await.unwrap();
        seed(&store, "OLD", 7).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let cutoff = timestamp::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        seed(&store, "NEW", 2).await;

        let config = RetentionConfig {
            retention_days: 30,
            batch_limit: 3,
        };
        let report = RetentionSweeper::new(store.clone(), config)
            .unwrap()
            .sweep_before(cutoff)
            .await
            .unwrap();

        assert_eq!(report.deleted, 7);
        assert_eq!(report.batches, 3);

        let remaining = store.list_recent(10).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|e| e.entity_id.starts_with("NEW")));
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_extra_empty_batch() {
        let store = AuditStore::in_memory().await.unwrap();
        seed(&store, "OLD", 4).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let config = RetentionConfig {
            retention_days: 30,
            batch_limit: 2,
        };
        let report = RetentionSweeper::new(store.clone(), config)
            .unwrap()
            .sweep_before(timestamp::now())
            .await
            .unwrap();

        assert_eq!(report.deleted, 4);
        assert_eq!(report.batches, 3);
        assert!(store.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_keeps_events_inside_window() {
        let store = AuditStore::in_memory().await.unwrap();
        seed(&store, "RECENT", 3).await;

        let sweeper = RetentionSweeper::new(store.clone(), RetentionConfig::default()).unwrap();
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(report.batches, 1);
        assert_eq!(store.list_recent(10).await.unwrap().len(), 3);
    }
}
