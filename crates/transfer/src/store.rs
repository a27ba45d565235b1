//! SQLite storage for transfer proposals

use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tranche_core::distribution::OwnershipRecord;
use tranche_core::{timestamp, AssetId, OwnerId, Percentage};

use crate::pending::{PendingTransfer, TransferStatus};

/// Errors from the transfer store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Corrupt transfer row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    #[error("Transfer {0} has already been resubmitted")]
    AlreadyResubmitted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Distributions an approval moved between, recorded before the movement
/// is submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalSnapshot {
    pub before: Vec<OwnershipRecord>,
    pub after: Vec<OwnershipRecord>,
}

const COLUMNS: &str = "id, deal_id, asset_id, from_owner_id, to_owner_id, percentage, status, \
    created_at, created_by, reviewed_at, reviewed_by, review_notes, rejection_count, previous_transfer_id";

/// SQLite storage for transfer proposals
#[derive(Clone)]
pub struct TransferStore {
    pool: SqlitePool,
}

impl TransferStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and initialize the schema
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_transfers (
                id TEXT PRIMARY KEY,
                deal_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                from_owner_id TEXT NOT NULL,
                to_owner_id TEXT NOT NULL,
                percentage TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by TEXT,
                review_notes TEXT,
                rejection_count INTEGER NOT NULL DEFAULT 0,
                previous_transfer_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for efficient status queries
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_transfers_status ON pending_transfers(status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pending_transfers_asset ON pending_transfers(asset_id)")
            .execute(&self.pool)
            .await?;

        // A rejected transfer has at most one successor
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_transfers_previous \
             ON pending_transfers(previous_transfer_id) WHERE previous_transfer_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS approval_snapshots (
                transfer_id TEXT PRIMARY KEY,
                before_state TEXT NOT NULL,
                after_state TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new transfer.
    ///
    /// Fails with [`StoreError::AlreadyResubmitted`] if another transfer
    /// already continues the same `previous_transfer_id`.
    pub async fn save(&self, transfer: &PendingTransfer) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO pending_transfers ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&transfer.id)
        .bind(&transfer.deal_id)
        .bind(transfer.asset_id.as_str())
        .bind(transfer.from_owner_id.as_str())
        .bind(transfer.to_owner_id.as_str())
        .bind(transfer.percentage.to_string())
        .bind(transfer.status.as_str())
        .bind(timestamp::encode(&transfer.created_at))
        .bind(&transfer.created_by)
        .bind(transfer.reviewed_at.as_ref().map(timestamp::encode))
        .bind(&transfer.reviewed_by)
        .bind(&transfer.review_notes)
        .bind(i64::from(transfer.rejection_count))
        .bind(&transfer.previous_transfer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let successor_exists = matches!(
                &e,
                sqlx::Error::Database(db)
                    if db.is_unique_violation() && db.message().contains("previous_transfer_id")
            );
            match &transfer.previous_transfer_id {
                Some(previous) if successor_exists => StoreError::AlreadyResubmitted(previous.clone()),
                _ => StoreError::Database(e),
            }
        })?;

        Ok(())
    }

    /// The transfer that resubmitted `previous_id`, if any
    pub async fn find_resubmission(&self, previous_id: &str) -> Result<Option<PendingTransfer>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM pending_transfers WHERE previous_transfer_id = ?"
        ))
        .bind(previous_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// Record the distributions an approval is about to move between.
    /// A later attempt for the same transfer overwrites the earlier one.
    pub async fn record_snapshot(&self, transfer_id: &str, snapshot: &ApprovalSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO approval_snapshots (transfer_id, before_state, after_state, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(transfer_id) DO UPDATE SET
                before_state = excluded.before_state,
                after_state = excluded.after_state,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(transfer_id)
        .bind(serde_json::to_string(&snapshot.before)?)
        .bind(serde_json::to_string(&snapshot.after)?)
        .bind(timestamp::encode(&timestamp::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn snapshot(&self, transfer_id: &str) -> Result<Option<ApprovalSnapshot>, StoreError> {
        let row = sqlx::query("SELECT before_state, after_state FROM approval_snapshots WHERE transfer_id = ?")
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<ApprovalSnapshot, StoreError> {
            let corrupt = |column: &str, e: serde_json::Error| StoreError::CorruptRow {
                id: transfer_id.to_string(),
                reason: format!("{column}: {e}"),
            };
            Ok(ApprovalSnapshot {
                before: serde_json::from_str(row.get::<&str, _>("before_state"))
                    .map_err(|e| corrupt("before_state", e))?,
                after: serde_json::from_str(row.get::<&str, _>("after_state"))
                    .map_err(|e| corrupt("after_state", e))?,
            })
        })
        .transpose()
    }

    /// Get a transfer by ID
    pub async fn get(&self, id: &str) -> Result<PendingTransfer, StoreError> {
        self.find(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn find(&self, id: &str) -> Result<Option<PendingTransfer>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM pending_transfers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    /// List transfers with a specific status, newest first
    pub async fn list_by_status(&self, status: TransferStatus, limit: u32) -> Result<Vec<PendingTransfer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM pending_transfers WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Move a pending transfer to a terminal status.
    ///
    /// Compare-and-swap on `status = 'pending'`: returns `false` if the
    /// transfer was already reviewed.
    pub async fn mark_reviewed(&self, reviewed: &PendingTransfer) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_transfers
            SET status = ?, reviewed_at = ?, reviewed_by = ?, review_notes = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reviewed.status.as_str())
        .bind(reviewed.reviewed_at.as_ref().map(timestamp::encode))
        .bind(&reviewed.reviewed_by)
        .bind(&reviewed.review_notes)
        .bind(&reviewed.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Count transfers by status
    pub async fn count_by_status(&self, status: TransferStatus) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM pending_transfers WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(count as u64)
    }
}

fn decode_row(row: &SqliteRow) -> Result<PendingTransfer, StoreError> {
    let id: String = row.get("id");
    let corrupt = |reason: String| StoreError::CorruptRow {
        id: id.clone(),
        reason,
    };

    let asset_id = AssetId::new(row.get::<&str, _>("asset_id")).map_err(|e| corrupt(format!("asset_id: {e}")))?;
    let from_owner_id =
        OwnerId::new(row.get::<&str, _>("from_owner_id")).map_err(|e| corrupt(format!("from_owner_id: {e}")))?;
    let to_owner_id =
        OwnerId::new(row.get::<&str, _>("to_owner_id")).map_err(|e| corrupt(format!("to_owner_id: {e}")))?;
    let percentage = Decimal::from_str(row.get::<&str, _>("percentage"))
        .map_err(|e| corrupt(format!("percentage: {e}")))
        .and_then(|d| Percentage::new(d).map_err(|e| corrupt(format!("percentage: {e}"))))?;
    let status = TransferStatus::from_str(row.get::<&str, _>("status"))
        .map_err(|e| corrupt(format!("status: {e}")))?;
    let created_at =
        timestamp::decode(row.get::<&str, _>("created_at")).map_err(|e| corrupt(format!("created_at: {e}")))?;
    let reviewed_at = row
        .get::<Option<&str>, _>("reviewed_at")
        .map(timestamp::decode)
        .transpose()
        .map_err(|e| corrupt(format!("reviewed_at: {e}")))?;
    let rejection_count = u32::try_from(row.get::<i64, _>("rejection_count"))
        .map_err(|e| corrupt(format!("rejection_count: {e}")))?;

    Ok(PendingTransfer {
        id: id.clone(),
        deal_id: row.get("deal_id"),
        asset_id,
        from_owner_id,
        to_owner_id,
        percentage,
        status,
        created_at,
        created_by: row.get("created_by"),
        reviewed_at,
        reviewed_by: row.get("reviewed_by"),
        review_notes: row.get("review_notes"),
        rejection_count,
        previous_transfer_id: row.get("previous_transfer_id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn create_test_transfer() -> PendingTransfer {
        PendingTransfer::new(
            "deal-1",
            AssetId::new("A1").unwrap(),
            OwnerId::pool(),
            OwnerId::new("INV-1").unwrap(),
            Percentage::new(dec!(12.5)).unwrap(),
            "maker-1",
        )
    }

    #[tokio::test]
    async fn test_store_save_and_get() {
        let store = TransferStore::in_memory().await.unwrap();
        let transfer = create_test_transfer();

        store.save(&transfer).await.unwrap();
        let retrieved = store.get(&transfer.id).await.unwrap();

        assert_eq!(retrieved, transfer);
        assert_eq!(retrieved.percentage.value(), dec!(12.5));
    }

    #[tokio::test]
    async fn test_store_get_missing() {
        let store = TransferStore::in_memory().await.unwrap();
        assert!(matches!(store.get("TRF-NOPE").await, Err(StoreError::NotFound(_))));
        assert!(store.find("TRF-NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_id() {
        let store = TransferStore::in_memory().await.unwrap();
        let transfer = create_test_transfer();
        store.save(&transfer).await.unwrap();
        assert!(matches!(store.save(&transfer).await, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_mark_reviewed_is_compare_and_swap() {
        let store = TransferStore::in_memory().await.unwrap();
        let transfer = create_test_transfer();
        store.save(&transfer).await.unwrap();

        let approved = transfer
            .clone()
            .reviewed(TransferStatus::Approved, "checker-1", Some("ok".into()), timestamp::now());
        assert!(store.mark_reviewed(&approved).await.unwrap());

        let rejected = transfer.reviewed(TransferStatus::Rejected, "checker-2", None, timestamp::now());
        assert!(!store.mark_reviewed(&rejected).await.unwrap());

        let stored = store.get(&approved.id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Approved);
        assert_eq!(stored.reviewed_by.as_deref(), Some("checker-1"));
        assert_eq!(stored.review_notes.as_deref(), Some("ok"));
        assert_eq!(stored.reviewed_at, approved.reviewed_at);
    }

    #[tokio::test]
    async fn test_store_list_by_status_newest_first() {
        let store = TransferStore::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let transfer = create_test_transfer();
            ids.push(transfer.id.clone());
            store.save(&transfer).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let pending = store.list_by_status(TransferStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.iter().map(|t| t.id.clone()).collect::<Vec<_>>(), ids.into_iter().rev().collect::<Vec<_>>());

        assert_eq!(store.list_by_status(TransferStatus::Pending, 2).await.unwrap().len(), 2);
        assert!(store.list_by_status(TransferStatus::Approved, 10).await.unwrap().is_empty());
        assert_eq!(store.count_by_status(TransferStatus::Pending).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_one_resubmission_per_rejected_transfer() {
        let store = TransferStore::in_memory().await.unwrap();
        let transfer = create_test_transfer();
        store.save(&transfer).await.unwrap();
        let rejected = transfer.reviewed(TransferStatus::Rejected, "checker-1", Some("no".into()), timestamp::now());
        store.mark_reviewed(&rejected).await.unwrap();

        assert!(store.find_resubmission(&rejected.id).await.unwrap().is_none());
        let next = rejected.resubmission("maker-1");
        store.save(&next).await.unwrap();
        assert_eq!(store.find_resubmission(&rejected.id).await.unwrap(), Some(next));

        let duplicate = rejected.resubmission("maker-1");
        assert!(matches!(
            store.save(&duplicate).await,
            Err(StoreError::AlreadyResubmitted(id)) if id == rejected.id
        ));
    }

    #[tokio::test]
    async fn test_snapshot_overwritten_by_later_attempt() {
        let store = TransferStore::in_memory().await.unwrap();
        let asset = AssetId::new("A1").unwrap();
        assert!(store.snapshot("TRF-1").await.unwrap().is_none());

        let first = ApprovalSnapshot {
            before: vec![OwnershipRecord::pool_owned(asset.clone())],
            after: vec![OwnershipRecord::pool_owned(asset.clone())],
        };
        store.record_snapshot("TRF-1", &first).await.unwrap();

        let second = ApprovalSnapshot {
            before: vec![OwnershipRecord::pool_owned(asset.clone())],
            after: vec![
                OwnershipRecord::new(asset.clone(), OwnerId::pool(), Percentage::new(dec!(70)).unwrap()),
                OwnershipRecord::new(asset, OwnerId::new("INV-1").unwrap(), Percentage::new(dec!(30)).unwrap()),
            ],
        };
        store.record_snapshot("TRF-1", &second).await.unwrap();

        assert_eq!(store.snapshot("TRF-1").await.unwrap(), Some(second));
    }
}
