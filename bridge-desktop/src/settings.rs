//! Preferences persisted in a single SQLite table of JSON values.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
    time::{Clock, SystemClock},
};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// Values are stored as JSON text so numbers, booleans and strings written by
/// a remote device round-trip without losing their type.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) the database file at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // sqlite URLs take forward slashes on every platform
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid DB path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self::with_pool(pool).await?;
        debug!(path = %db_path.display(), "Settings store ready");
        Ok(store)
    }

    /// Throwaway store, gone when dropped
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the settings table if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;

        Ok(Self { pool })
    }

    fn decode(key: &str, raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            // Rows written by older builds held bare strings
            warn!(key = key, error = %e, "Setting is not JSON; treating as string");
            Value::String(raw.to_string())
        })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get_all(&self) -> Result<HashMap<String, Value>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to list settings: {}", e)))?;

        let settings = rows
            .into_iter()
            .map(|row| {
                let key: String = row.get(0);
                let raw: String = row.get(1);
                let value = Self::decode(&key, &raw);
                (key, value)
            })
            .collect();

        Ok(settings)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get setting: {}", e)))?;

        Ok(row.map(|row| {
            let raw: String = row.get(0);
            Self::decode(key, &raw)
        }))
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let encoded = serde_json::to_string(&value)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to encode setting: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(encoded)
        .bind(SystemClock.unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to set setting: {}", e)))?;

        debug!(key = key, "Stored setting");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete setting: {}", e)))?;

        debug!(key = key, "Deleted setting");
        Ok(())
    }
}
