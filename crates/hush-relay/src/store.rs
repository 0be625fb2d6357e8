//! Key record and blob storage

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use hush_proto::v1::PublishedKeyRecordV1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Record store trait
///
/// For each `(user_id, device_id)` at most one record has `current == true`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Mark the device's current record superseded at `superseded_at` and
    /// insert `record` as the new current one, atomically.
    async fn supersede_and_insert(
        &self,
        record: &PublishedKeyRecordV1,
        superseded_at: u64,
    ) -> Result<(), StoreError>;
    async fn current_for_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, StoreError>;
    /// Most recently created current record across the user's devices.
    async fn current_for_user(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, StoreError>;
    /// All records of a device, oldest first.
    async fn history(&self, user_id: &str, device_id: &str) -> Result<Vec<PublishedKeyRecordV1>, StoreError>;

    async fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<(), StoreError>;
    async fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store, for tests and throwaway relays
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<HashMap<(String, String), Vec<PublishedKeyRecordV1>>>,
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn supersede_and_insert(
        &self,
        record: &PublishedKeyRecordV1,
        superseded_at: u64,
    ) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let records = keys
            .entry((record.user_id.clone(), record.device_id.clone()))
            .or_default();
        for previous in records.iter_mut().filter(|r| r.current) {
            previous.current = false;
            previous.superseded_at = Some(superseded_at);
        }
        records.push(record.clone());
        Ok(())
    }

    async fn current_for_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, StoreError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .get(&(user_id.to_string(), device_id.to_string()))
            .and_then(|records| records.iter().find(|r| r.current))
            .cloned())
    }

    async fn current_for_user(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, StoreError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter(|((u, _), _)| u == user_id)
            .flat_map(|(_, records)| records.iter().filter(|r| r.current))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn history(&self, user_id: &str, device_id: &str) -> Result<Vec<PublishedKeyRecordV1>, StoreError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(blob_id.to_string(), data.to_vec());
        Ok(())
    }

    async fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(blob_id).map(|b| b.value().clone()))
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// SQLite-based record store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

const RECORD_COLUMNS: &str =
    "user_id, device_id, public_key, key_id, created_at, current, superseded_at";

fn record_from_row(row: &Row<'_>) -> Result<PublishedKeyRecordV1, rusqlite::Error> {
    Ok(PublishedKeyRecordV1 {
        user_id: row.get(0)?,
        device_id: row.get(1)?,
        public_key: row.get(2)?,
        key_id: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        current: row.get(5)?,
        superseded_at: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
    })
}

impl SqliteStore {
    /// Create new SQLite store
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn).map_err(StoreError::Database)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS key_records (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    public_key BLOB NOT NULL,
                    key_id TEXT NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL,
                    current INTEGER NOT NULL,
                    superseded_at INTEGER
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_key_records_one_current
                ON key_records (user_id, device_id) WHERE current = 1;

                CREATE INDEX IF NOT EXISTS idx_key_records_user
                ON key_records (user_id, created_at);

                CREATE TABLE IF NOT EXISTS blobs (
                    blob_id TEXT PRIMARY KEY,
                    data BLOB NOT NULL,
                    stored_at INTEGER NOT NULL
                );
                "#,
            )
        })
        .await
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn supersede_and_insert(
        &self,
        record: &PublishedKeyRecordV1,
        superseded_at: u64,
    ) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE key_records SET current = 0, superseded_at = ?3
                 WHERE user_id = ?1 AND device_id = ?2 AND current = 1",
                params![record.user_id, record.device_id, superseded_at as i64],
            )?;
            tx.execute(
                &format!("INSERT INTO key_records ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.user_id,
                    record.device_id,
                    record.public_key,
                    record.key_id,
                    record.created_at as i64,
                    record.current,
                    record.superseded_at.map(|v| v as i64),
                ],
            )?;
            tx.commit()
        })
        .await
    }

    async fn current_for_device(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, StoreError> {
        let (user_id, device_id) = (user_id.to_string(), device_id.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM key_records
                     WHERE user_id = ?1 AND device_id = ?2 AND current = 1"
                ),
                params![user_id, device_id],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    async fn current_for_user(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM key_records
                     WHERE user_id = ?1 AND current = 1
                     ORDER BY created_at DESC, seq DESC LIMIT 1"
                ),
                params![user_id],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    async fn history(&self, user_id: &str, device_id: &str) -> Result<Vec<PublishedKeyRecordV1>, StoreError> {
        let (user_id, device_id) = (user_id.to_string(), device_id.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM key_records
                 WHERE user_id = ?1 AND device_id = ?2 ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map(params![user_id, device_id], record_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<(), StoreError> {
        let (blob_id, data) = (blob_id.to_string(), data.to_vec());
        let stored_at = chrono::Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO blobs (blob_id, data, stored_at) VALUES (?1, ?2, ?3)",
                params![blob_id, data, stored_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let blob_id = blob_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT data FROM blobs WHERE blob_id = ?1",
                params![blob_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }
}
