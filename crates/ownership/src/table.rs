//! Local ownership table (SQLite)
//!
//! Movements are applied in one transaction that also records the
//! idempotency key, so replaying a key never moves ownership twice.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tranche_core::distribution::{self, OwnershipRecord};
use tranche_core::{timestamp, AssetId, OwnerId};

use crate::error::{OwnershipError, OwnershipResult};
use crate::ledger::{validate_legs, MovementLeg, MovementReceipt};

/// Ownership rows stored next to the application's relational data
#[derive(Clone)]
pub struct OwnershipTable {
    pool: SqlitePool,
}

impl OwnershipTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and initialize the schema
    pub async fn open(db_path: impl AsRef<Path>) -> OwnershipResult<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        let table = Self::new(pool);
        table.init().await?;
        Ok(table)
    }

    /// Create an in-memory table (for testing)
    pub async fn in_memory() -> OwnershipResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let table = Self::new(pool);
        table.init().await?;
        Ok(table)
    }

    /// Initialize the schema
    pub async fn init(&self) -> OwnershipResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ownership_records (
                asset_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                percentage TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (asset_id, owner_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ownership_movements (
                idempotency_key TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                legs TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a new asset wholly owned by the pool
    pub async fn seed_pool(&self, asset_id: &AssetId) -> OwnershipResult<()> {
        self.seed(&[OwnershipRecord::pool_owned(asset_id.clone())]).await
    }

    /// Register a new asset with an explicit, settled distribution
    pub async fn seed(&self, records: &[OwnershipRecord]) -> OwnershipResult<()> {
        let asset_id = match records.first() {
            Some(first) => first.asset_id.clone(),
            None => return Err(OwnershipError::InvalidMovement("empty distribution".to_string())),
        };
        if records.iter().any(|r| r.asset_id != asset_id) {
            return Err(OwnershipError::InvalidMovement(
                "distribution spans more than one asset".to_string(),
            ));
        }
        distribution::ensure_settled(&asset_id, records)?;

        let mut tx = self.pool.begin().await?;
        let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM ownership_records WHERE asset_id = ?")
            .bind(asset_id.as_str())
            .fetch_one(&mut *tx)
            .await?
            .get("n");
        if existing > 0 {
            return Err(OwnershipError::AssetExists(asset_id));
        }

        let now = timestamp::encode(&timestamp::now());
        for record in records {
            insert_row(&mut tx, record, &now).await?;
        }
        tx.commit().await?;

        tracing::info!(asset_id = %asset_id, owners = records.len(), "Asset ownership seeded");
        Ok(())
    }

    /// Raw rows for an asset, as stored
    pub async fn rows(&self, asset_id: &AssetId) -> OwnershipResult<Vec<(OwnerId, Decimal)>> {
        let rows = sqlx::query("SELECT owner_id, percentage FROM ownership_records WHERE asset_id = ?")
            .bind(asset_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let owner: &str = row.get("owner_id");
                let pct: &str = row.get("percentage");
                let owner_id = OwnerId::new(owner)
                    .map_err(|e| OwnershipError::CorruptRow(format!("owner_id {owner:?}: {e}")))?;
                let percentage = Decimal::from_str(pct)
                    .map_err(|e| OwnershipError::CorruptRow(format!("percentage {pct:?}: {e}")))?;
                Ok((owner_id, percentage))
            })
            .collect()
    }

    /// Whether a movement with this key has already been applied
    pub async fn is_applied(&self, idempotency_key: &str) -> OwnershipResult<bool> {
        let row = sqlx::query("SELECT 1 FROM ownership_movements WHERE idempotency_key = ?")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Apply a movement atomically.
    ///
    /// `expected_before` is compared against the rows inside the
    /// transaction; any difference fails with [`OwnershipError::Drift`]
    /// and nothing is written.
    pub async fn apply_movement(
        &self,
        idempotency_key: &str,
        asset_id: &AssetId,
        legs: &[MovementLeg],
        expected_before: &[OwnershipRecord],
    ) -> OwnershipResult<MovementReceipt> {
        validate_legs(asset_id, legs)?;

        let mut tx = self.pool.begin().await?;

        let replay = sqlx::query("SELECT 1 FROM ownership_movements WHERE idempotency_key = ?")
            .bind(idempotency_key)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if replay {
            tracing::info!(idempotency_key, asset_id = %asset_id, "Movement already applied");
            return Ok(MovementReceipt {
                idempotency_key: idempotency_key.to_string(),
                applied: false,
            });
        }

        let rows = sqlx::query("SELECT owner_id, percentage FROM ownership_records WHERE asset_id = ?")
            .bind(asset_id.as_str())
            .fetch_all(&mut *tx)
            .await?;
        let mut shares: BTreeMap<OwnerId, Decimal> = BTreeMap::new();
        for row in &rows {
            let owner: &str = row.get("owner_id");
            let pct: &str = row.get("percentage");
            let owner_id = OwnerId::new(owner)
                .map_err(|e| OwnershipError::CorruptRow(format!("owner_id {owner:?}: {e}")))?;
            let percentage = Decimal::from_str(pct)
                .map_err(|e| OwnershipError::CorruptRow(format!("percentage {pct:?}: {e}")))?;
            shares.insert(owner_id, percentage);
        }

        let current = distribution::normalize(asset_id, shares.clone())?;
        if current.is_empty() {
            return Err(OwnershipError::UnknownAsset(asset_id.clone()));
        }
        if current != expected_before {
            return Err(OwnershipError::Drift(asset_id.clone()));
        }

        for leg in legs {
            *shares.entry(leg.owner_id.clone()).or_insert(Decimal::ZERO) += leg.delta;
        }
        let after = distribution::normalize(asset_id, shares)?;
        distribution::ensure_settled(asset_id, &after)?;

        sqlx::query("DELETE FROM ownership_records WHERE asset_id = ?")
            .bind(asset_id.as_str())
            .execute(&mut *tx)
            .await?;
        let now = timestamp::encode(&timestamp::now());
        for record in &after {
            insert_row(&mut tx, record, &now).await?;
        }

        sqlx::query(
            "INSERT INTO ownership_movements (idempotency_key, asset_id, legs, applied_at) VALUES (?, ?, ?, ?)",
        )
        .bind(idempotency_key)
        .bind(asset_id.as_str())
        .bind(serde_json::to_string(legs)?)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MovementReceipt {
            idempotency_key: idempotency_key.to_string(),
            applied: true,
        })
    }
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &OwnershipRecord,
    updated_at: &str,
) -> OwnershipResult<()> {
    sqlx::query(
        "INSERT INTO ownership_records (asset_id, owner_id, percentage, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(record.asset_id.as_str())
    .bind(record.owner_id.as_str())
    .bind(record.percentage.to_string())
    .bind(updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
