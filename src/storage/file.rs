use async_trait::async_trait;
use std::sync::Arc;

use super::bridge::{backup_prefix, FileBridge, StorageInfo, BACKUP_DIR};
use super::{StorageBackend, StorageKind, CONNECTIONS_FILE};
use crate::error::StorageError;
use crate::models::Connection;
use crate::services::serializer;

/// Connections stored as a JSON envelope file in the application data directory
pub struct FileBackend {
    bridge: Arc<dyn FileBridge>,
    file_name: String,
}

impl FileBackend {
    pub fn new(bridge: Arc<dyn FileBridge>) -> Self {
        Self::with_file_name(bridge, CONNECTIONS_FILE)
    }

    pub fn with_file_name(bridge: Arc<dyn FileBridge>, file_name: impl Into<String>) -> Self {
        Self {
            bridge,
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn backup_path(name: &str) -> String {
        format!("{}/{}", BACKUP_DIR, name)
    }

    /// Sort key for a backup name: timestamp part, then collision counter
    ///
    /// `x-backup-<stamp>-10.json` must order after `x-backup-<stamp>-9.json`.
    fn backup_sort_key(name: &str) -> (&str, u32) {
        let stem = name.trim_end_matches(".json");
        match stem.rsplit_once('-') {
            Some((base, counter)) if base.ends_with('Z') => match counter.parse() {
                Ok(n) => (base, n),
                Err(_) => (stem, 0),
            },
            _ => (stem, 0),
        }
    }

    /// Backup names must stay inside the backup directory
    fn is_safe_backup_name(name: &str) -> bool {
        !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::File
    }

    fn location(&self) -> String {
        self.bridge
            .app_data_path()
            .join(&self.file_name)
            .display()
            .to_string()
    }

    async fn load(&self) -> Vec<Connection> {
        if !self.bridge.exists(&self.file_name).await {
            tracing::debug!("No connections file yet at {}", self.location());
            return Vec::new();
        }

        let content = match self.bridge.read_file(&self.file_name).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read connections file: {}", e);
                return Vec::new();
            }
        };

        match serializer::decode_stored(&content) {
            Ok(connections) => {
                tracing::info!("Loaded {} connections from file", connections.len());
                connections
            }
            Err(e) => {
                tracing::warn!("Connections file is not a valid envelope: {}", e);
                Vec::new()
            }
        }
    }

    async fn save(&self, connections: &[Connection]) -> Result<(), StorageError> {
        let content = serializer::encode_stored(connections, true)?;
        self.bridge.write_file(&self.file_name, &content).await?;
        tracing::debug!("Saved {} connections to file", connections.len());
        Ok(())
    }

    async fn backup(&self) -> Option<String> {
        if !self.bridge.exists(&self.file_name).await {
            return None;
        }
        match self.bridge.backup(&self.file_name).await {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!("Backup failed: {}", e);
                None
            }
        }
    }

    async fn list_backups(&self) -> Vec<String> {
        let prefix = backup_prefix(&self.file_name);
        let mut backups: Vec<String> = self
            .bridge
            .list_files(BACKUP_DIR)
            .await
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect();
        // Newest first
        backups.sort_by(|a, b| Self::backup_sort_key(b).cmp(&Self::backup_sort_key(a)));
        backups
    }

    async fn restore_backup(&self, name: &str) -> bool {
        if !Self::is_safe_backup_name(name) {
            tracing::warn!("Rejected backup name: {}", name);
            return false;
        }

        let path = Self::backup_path(name);
        if !self.bridge.exists(&path).await {
            tracing::warn!("Backup not found: {}", name);
            return false;
        }

        if self.bridge.exists(&self.file_name).await {
            if let Err(e) = self.bridge.backup(&self.file_name).await {
                tracing::error!("Safety backup before restore failed: {}", e);
                return false;
            }
        }

        let content = match self.bridge.read_file(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read backup {}: {}", name, e);
                return false;
            }
        };

        if let Err(e) = serializer::envelope_records(&content) {
            tracing::warn!("Backup {} is not a valid envelope: {}", name, e);
            return false;
        }

        match self.bridge.write_file(&self.file_name, &content).await {
            Ok(()) => {
                tracing::info!("Restored connections from backup {}", name);
                true
            }
            Err(e) => {
                tracing::error!("Failed to restore backup {}: {}", name, e);
                false
            }
        }
    }

    async fn info(&self) -> Option<StorageInfo> {
        self.bridge.file_info(&self.file_name).await
    }

    async fn has_data(&self) -> bool {
        self.bridge.exists(&self.file_name).await
    }
}
