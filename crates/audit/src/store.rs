//! SQLite audit event store
//!
//! Append-only: rows are never updated except for `emitted_at` and
//! `emit_failures`, and only the retention sweeper deletes them.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tranche_core::timestamp;

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditEvent, AuditRecord};
use crate::sanitize::SanitizerPolicy;

const SELECT_COLUMNS: &str = "SELECT id, event_type, entity_type, entity_id, actor_user_id, \
     timestamp, before_state, after_state, metadata, emitted_at, emit_failures \
     FROM audit_events";

/// Counts for operator dashboards and alerting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub total: u64,
    pub unemitted: u64,
    /// Unemitted events whose failure count reached the alert threshold
    pub stuck: u64,
}

/// Append-only audit log backed by SQLite
#[derive(Clone)]
pub struct AuditStore {
    pool: SqlitePool,
    sanitizer: Arc<SanitizerPolicy>,
}

impl AuditStore {
    /// Create a store on an existing pool with the default sanitizer
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            sanitizer: Arc::new(SanitizerPolicy::default()),
        }
    }

    /// Open (or create) a database file and initialize the schema
    pub async fn open(db_path: impl AsRef<Path>) -> AuditResult<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> AuditResult<Self> {
        // A single connection keeps every query on the same in-memory database
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

    /// Replace the sanitizer policy used on every write
    pub fn with_sanitizer(mut self, policy: SanitizerPolicy) -> Self {
        self.sanitizer = Arc::new(policy);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema
    pub async fn init(&self) -> AuditResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                actor_user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                before_state TEXT,
                after_state TEXT,
                metadata TEXT,
                emitted_at TEXT,
                emit_failures INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_audit_events_entity ON audit_events(entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_events_type ON audit_events(event_type)",
            "CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_audit_events_unemitted ON audit_events(seq) WHERE emitted_at IS NULL",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Append an event and return its id.
    ///
    /// Snapshots and metadata are sanitized here regardless of what the
    /// caller already did. This is a local write only; sink availability
    /// never affects it.
    pub async fn append(&self, record: AuditRecord) -> AuditResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = timestamp::now();

        let before = self.encode_state(record.before_state.as_ref())?;
        let after = self.encode_state(record.after_state.as_ref())?;
        let metadata = self.encode_state(record.metadata.as_ref())?;

        sqlx::query(
            r#"
            INSERT INTO audit_events
                (id, event_type, entity_type, entity_id, actor_user_id, timestamp,
                 before_state, after_state, metadata, emitted_at, emit_failures)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0)
            "#,
        )
        .bind(&id)
        .bind(&record.event_type)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(&record.actor_user_id)
        .bind(timestamp::encode(&now))
        .bind(before)
        .bind(after)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            event_id = %id,
            event_type = %record.event_type,
            entity_id = %record.entity_id,
            "Audit event appended"
        );

        Ok(id)
    }

    fn encode_state(&self, state: Option<&Value>) -> AuditResult<Option<String>> {
        state
            .map(|v| serde_json::to_string(&self.sanitizer.sanitize(v)))
            .transpose()
            .map_err(AuditError::from)
    }

    /// Get one event by id
    pub async fn get(&self, id: &str) -> AuditResult<Option<AuditEvent>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    /// Record a successful push. Returns `false` if the event was already
    /// marked (or no longer exists); calling twice is harmless.
    pub async fn mark_emitted(&self, id: &str) -> AuditResult<bool> {
        let result = sqlx::query(
            "UPDATE audit_events SET emitted_at = ? WHERE id = ? AND emitted_at IS NULL",
        )
        .bind(timestamp::encode(&timestamp::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed push. Returns `false` if the event no longer exists.
    pub async fn increment_failure(&self, id: &str) -> AuditResult<bool> {
        let result = sqlx::query(
            "UPDATE audit_events SET emit_failures = emit_failures + 1 WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Events not yet pushed to the sink, oldest first, at most `limit`
    pub async fn list_unemitted(&self, limit: u32) -> AuditResult<Vec<AuditEvent>> {
        self.fetch(
            &format!("{SELECT_COLUMNS} WHERE emitted_at IS NULL ORDER BY seq ASC LIMIT ?"),
            &[],
            limit,
        )
        .await
    }

    /// History of one entity, newest first
    pub async fn list_by_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: u32,
    ) -> AuditResult<Vec<AuditEvent>> {
        self.fetch(
            &format!(
                "{SELECT_COLUMNS} WHERE entity_type = ? AND entity_id = ? ORDER BY seq DESC LIMIT ?"
            ),
            &[entity_type, entity_id],
            limit,
        )
        .await
    }

    /// Events of one type, newest first
    pub async fn list_by_type(&self, event_type: &str, limit: u32) -> AuditResult<Vec<AuditEvent>> {
        self.fetch(
            &format!("{SELECT_COLUMNS} WHERE event_type = ? ORDER BY seq DESC LIMIT ?"),
            &[event_type],
            limit,
        )
        .await
    }

    /// Most recent events, newest first
    pub async fn list_recent(&self, limit: u32) -> AuditResult<Vec<AuditEvent>> {
        self.fetch(&format!("{SELECT_COLUMNS} ORDER BY seq DESC LIMIT ?"), &[], limit)
            .await
    }

    async fn fetch(&self, sql: &str, args: &[&str], limit: u32) -> AuditResult<Vec<AuditEvent>> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = query.bind(*arg);
        }
        let rows = query.bind(i64::from(limit)).fetch_all(&self.pool).await?;

        rows.iter().map(decode_row).collect()
    }

    /// Delete at most `limit` events older than `cutoff`, returning how many
    /// were removed. Callers loop until the count drops below `limit`.
    pub async fn delete_older_than(
        &self,
        cutoff: &chrono::DateTime<chrono::Utc>,
        limit: u32,
    ) -> AuditResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_events
            WHERE seq IN (
                SELECT seq FROM audit_events
                WHERE timestamp < ?
                ORDER BY seq ASC
                LIMIT ?
            )
            "#,
        )
        .bind(timestamp::encode(cutoff))
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Totals, with `stuck` counting unemitted events at or above `alert_threshold` failures
    pub async fn stats(&self, alert_threshold: u32) -> AuditResult<AuditStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN emitted_at IS NULL THEN 1 ELSE 0 END), 0) AS unemitted,
                COALESCE(SUM(CASE WHEN emitted_at IS NULL AND emit_failures >= ? THEN 1 ELSE 0 END), 0) AS stuck
            FROM audit_events
            "#,
        )
        .bind(i64::from(alert_threshold))
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditStats {
            total: row.get::<i64, _>("total") as u64,
            unemitted: row.get::<i64, _>("unemitted") as u64,
            stuck: row.get::<i64, _>("stuck") as u64,
        })
    }
}

fn decode_row(row: &SqliteRow) -> AuditResult<AuditEvent> {
    let id: String = row.get("id");
    let corrupt = |reason: String| AuditError::CorruptRow {
        id: id.clone(),
        reason,
    };

    let timestamp = timestamp::decode(row.get::<&str, _>("timestamp"))
        .map_err(|e| corrupt(format!("timestamp: {e}")))?;
    let emitted_at = row
        .get::<Option<&str>, _>("emitted_at")
        .map(timestamp::decode)
        .transpose()
        .map_err(|e| corrupt(format!("emitted_at: {e}")))?;

    let json_column = |column: &str| -> AuditResult<Option<Value>> {
        row.get::<Option<&str>, _>(column)
            .map(serde_json::from_str)
            .transpose()
            .map_err(AuditError::from)
    };

    Ok(AuditEvent {
        id: id.clone(),
        event_type: row.get("event_type"),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        actor_user_id: row.get("actor_user_id"),
        timestamp,
        before_state: json_column("before_state")?,
        after_state: json_column("after_state")?,
        metadata: json_column("metadata")?,
        emitted_at,
        emit_failures: row.get::<i64, _>("emit_failures") as u32,
    })
}
