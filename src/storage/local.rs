use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::bridge::StorageInfo;
use super::{StorageBackend, StorageKind, STORAGE_KEY};
use crate::error::StorageError;
use crate::models::{timestamp, Connection};
use crate::services::serializer;

/// String key/value persistence offered by the host
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Returns whether a value was removed
    async fn remove_item(&self, key: &str) -> Result<bool, StorageError>;
}

/// Process-local store, used in tests and when no database file is configured
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.items.write().await.remove(key).is_some())
    }
}

/// Connections stored as one compact envelope under a single key
pub struct LocalBackend {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: STORAGE_KEY.to_string(),
        }
    }

    async fn read_raw(&self) -> Option<String> {
        match self.store.get_item(&self.key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read local store: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn location(&self) -> String {
        format!("local-store:{}", self.key)
    }

    async fn load(&self) -> Vec<Connection> {
        let Some(content) = self.read_raw().await else {
            return Vec::new();
        };

        match serializer::decode_stored(&content) {
            Ok(connections) => {
                tracing::info!("Loaded {} connections from local store", connections.len());
                connections
            }
            Err(e) => {
                tracing::warn!("Local store value is not a valid envelope: {}", e);
                Vec::new()
            }
        }
    }

    async fn save(&self, connections: &[Connection]) -> Result<(), StorageError> {
        let content = serializer::encode_stored(connections, false)?;
        self.store.set_item(&self.key, &content).await?;
        tracing::debug!("Saved {} connections to local store", connections.len());
        Ok(())
    }

    async fn info(&self) -> Option<StorageInfo> {
        let content = self.read_raw().await?;
        let now = timestamp::now();
        Some(StorageInfo {
            size: content.len() as u64,
            created_at: now,
            modified_at: now,
            location: self.location(),
        })
    }

    async fn has_data(&self) -> bool {
        self.read_raw().await.is_some()
    }
}
