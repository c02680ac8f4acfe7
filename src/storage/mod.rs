pub mod bridge;
pub mod file;
pub mod local;
pub mod selector;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StorageError;
use crate::models::Connection;

pub use bridge::{AppDataDir, FileBridge, StorageInfo};
pub use file::FileBackend;
pub use local::{KeyValueStore, LocalBackend, MemoryKeyValueStore};
pub use selector::{BackendPreference, Capabilities, ConnectionStore, StorageSelector, StorageStatus};
pub use sqlite::SqliteKeyValueStore;

/// Primary document name inside the data directory
pub const CONNECTIONS_FILE: &str = "connections.json";

/// Key holding the envelope in a key/value store
pub const STORAGE_KEY: &str = "database_connections";

/// Which persistence mechanism is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    Local,
    Unavailable,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::File => "file",
            StorageKind::Local => "local",
            StorageKind::Unavailable => "unavailable",
        }
    }
}

/// Uniform contract over the persistence mechanisms
///
/// Reads never fail: I/O and parse problems are logged and produce empty
/// results. Only `save` reports errors.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Human-readable location of the primary document
    fn location(&self) -> String;

    async fn load(&self) -> Vec<Connection>;

    async fn save(&self, connections: &[Connection]) -> Result<(), StorageError>;

    /// Copy the primary document aside; returns the backup name
    async fn backup(&self) -> Option<String> {
        None
    }

    /// Backup names, newest first
    async fn list_backups(&self) -> Vec<String> {
        Vec::new()
    }

    async fn restore_backup(&self, _name: &str) -> bool {
        false
    }

    async fn info(&self) -> Option<StorageInfo>;

    /// Whether a primary document has been written
    async fn has_data(&self) -> bool;
}

/// Backend used when the host offers no persistence; every call is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

#[async_trait]
impl StorageBackend for UnavailableBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Unavailable
    }

    fn location(&self) -> String {
        "unavailable".to_string()
    }

    async fn load(&self) -> Vec<Connection> {
        Vec::new()
    }

    async fn save(&self, connections: &[Connection]) -> Result<(), StorageError> {
        tracing::debug!(
            "Storage unavailable, {} connections kept in memory only",
            connections.len()
        );
        Ok(())
    }

    async fn info(&self) -> Option<StorageInfo> {
        None
    }

    async fn has_data(&self) -> bool {
        false
    }
}
