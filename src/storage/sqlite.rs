use async_trait::async_trait;
use rusqlite::{Connection as SqliteConnection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::local::KeyValueStore;
use crate::error::StorageError;

/// Key/value store kept in a single-table SQLite database
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteKeyValueStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteKeyValueStore {
    /// Open (or create) the database file
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Accept SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path = path_str
            .trim_start_matches("sqlite:")
            .trim_start_matches("//");

        if let Some(parent) = Path::new(clean_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = SqliteConnection::open(clean_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        tracing::info!("Local store opened at {}", clean_path);
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Arc::new(Mutex::new(SqliteConnection::open_in_memory()?)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().await;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM kv_store WHERE key = ?1",
            rusqlite::params![key],
        )?;
        Ok(removed > 0)
    }
}
