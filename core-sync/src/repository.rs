//! # History Repository
//!
//! Local persistence for watch-history records.
//!
//! ## Overview
//!
//! The sync engine only needs three operations from local storage: read the
//! whole set, insert a batch of new records and overwrite a batch of existing
//! ones. Hosts with their own database implement [`HistoryRepository`]
//! directly; desktop builds use [`SqliteHistoryRepository`].

use crate::{HistoryRecord, Result, SyncError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for watch-history persistence
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Load every local record
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails
    async fn find_all(&self) -> Result<Vec<HistoryRecord>>;

    /// Insert records that have no local counterpart
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails. The batch is applied
    /// atomically.
    async fn insert(&self, records: &[HistoryRecord]) -> Result<()>;

    /// Overwrite existing records in full
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails. The batch is applied
    /// atomically.
    async fn update(&self, records: &[HistoryRecord]) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of HistoryRepository
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

/// Database row representation of a history record
#[derive(Debug, FromRow)]
struct HistoryRow {
    key: String,
    create_time: i64,
    position: i64,
    extra: Option<String>,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = SyncError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        let extra = match row.extra.as_deref() {
            None | Some("") => Map::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    return Err(SyncError::Repository(format!(
                        "Invalid extra payload for key {}",
                        row.key
                    )))
                }
            },
        };

        Ok(HistoryRecord {
            key: row.key,
            create_time: row.create_time,
            position: row.position,
            extra,
        })
    }
}

impl SqliteHistoryRepository {
    /// Create a new SQLite history repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the history table if it does not exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                key TEXT PRIMARY KEY NOT NULL,
                create_time INTEGER NOT NULL,
                position INTEGER NOT NULL DEFAULT -1,
                extra TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Repository(e.to_string()))?;

        Ok(())
    }

    fn encode_extra(record: &HistoryRecord) -> Result<Option<String>> {
        if record.extra.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(&record.extra)
            .map(Some)
            .map_err(|e| SyncError::Repository(e.to_string()))
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn find_all(&self) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT key, create_time, position, extra FROM history ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Repository(e.to_string()))?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    async fn insert(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;

        for record in records {
            // A record touched locally since the snapshot was taken keeps the newer copy
            sqlx::query(
                r#"
                INSERT INTO history (key, create_time, position, extra)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    create_time = excluded.create_time,
                    position = excluded.position,
                    extra = excluded.extra
                WHERE excluded.create_time > history.create_time
                "#,
            )
            .bind(&record.key)
            .bind(record.create_time)
            .bind(record.position)
            .bind(Self::encode_extra(record)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;

        debug!(count = records.len(), "Inserted history records");
        Ok(())
    }

    async fn update(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;

        for record in records {
            sqlx::query(
                r#"
                UPDATE history SET
                    create_time = ?,
                    position = ?,
                    extra = ?
                WHERE key = ?
                "#,
            )
            .bind(record.create_time)
            .bind(record.position)
            .bind(Self::encode_extra(record)?)
            .bind(&record.key)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Repository(e.to_string()))?;

        debug!(count = records.len(), "Updated history records");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_repository() -> SqliteHistoryRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteHistoryRepository::new(pool);
        repo.initialize().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_insert_and_find_all() {
        let repo = create_repository().await;

        let mut with_extra = HistoryRecord::new("b", 20, 7);
        with_extra
            .extra
            .insert("vodName".to_string(), Value::from("Show"));

        repo.insert(&[HistoryRecord::new("a", 10, -1), with_extra.clone()])
            .await
            .unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all, vec![HistoryRecord::new("a", 10, -1), with_extra]);
    }

    #[tokio::test]
    async fn test_update_overwrites_whole_record() {
        let repo = create_repository().await;
        repo.insert(&[HistoryRecord::new("a", 10, 1)]).await.unwrap();

        repo.update(&[HistoryRecord::new("a", 30, 99)]).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all, vec![HistoryRecord::new("a", 30, 99)]);
    }

    #[tokio::test]
    async fn test_insert_does_not_clobber_newer_local_record() {
        let repo = create_repository().await;
        repo.insert(&[HistoryRecord::new("a", 500, 1)]).await.unwrap();

        repo.insert(&[HistoryRecord::new("a", 100, 2)]).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all, vec![HistoryRecord::new("a", 500, 1)]);
    }

    #[tokio::test]
    async fn test_empty_batches_are_noops() {
        let repo = create_repository().await;
        repo.insert(&[]).await.unwrap();
        repo.update(&[]).await.unwrap();
        assert!(repo.find_all().await.unwrap().is_empty());
    }
}
