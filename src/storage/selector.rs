use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::bridge::{FileBridge, StorageInfo};
use super::file::FileBackend;
use super::local::{KeyValueStore, LocalBackend};
use super::{StorageBackend, StorageKind, UnavailableBackend, CONNECTIONS_FILE};
use crate::crypto::FieldCipher;
use crate::error::StorageError;
use crate::models::Connection;

/// Configured backend choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Auto,
    File,
    Local,
    None,
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(BackendPreference::Auto),
            "file" => Ok(BackendPreference::File),
            "local" => Ok(BackendPreference::Local),
            "none" | "memory" => Ok(BackendPreference::None),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Persistence capabilities the host environment offers
#[derive(Clone, Default)]
pub struct Capabilities {
    pub file_bridge: Option<Arc<dyn FileBridge>>,
    pub local_store: Option<Arc<dyn KeyValueStore>>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_file_bridge(mut self, bridge: Arc<dyn FileBridge>) -> Self {
        self.file_bridge = Some(bridge);
        self
    }

    pub fn with_local_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.local_store = Some(store);
        self
    }
}

/// Chooses the storage backend once at startup
pub struct StorageSelector;

impl StorageSelector {
    pub fn select(
        preference: BackendPreference,
        capabilities: &Capabilities,
        file_name: &str,
    ) -> Box<dyn StorageBackend> {
        let file = || {
            capabilities
                .file_bridge
                .clone()
                .map(|bridge| Box::new(FileBackend::with_file_name(bridge, file_name)) as Box<dyn StorageBackend>)
        };
        let local = || {
            capabilities
                .local_store
                .clone()
                .map(|store| Box::new(LocalBackend::new(store)) as Box<dyn StorageBackend>)
        };

        let selected = match preference {
            BackendPreference::Auto => file().or_else(local),
            BackendPreference::File => file(),
            BackendPreference::Local => local(),
            BackendPreference::None => None,
        };

        match selected {
            Some(backend) => {
                tracing::info!(
                    "Using {} storage at {}",
                    backend.kind().as_str(),
                    backend.location()
                );
                backend
            }
            None => {
                tracing::warn!(
                    "No storage backend available for preference {:?}; connections will not persist",
                    preference
                );
                Box::new(UnavailableBackend)
            }
        }
    }
}

/// Snapshot of the active storage, as shown to the user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub available: bool,
    pub environment: StorageKind,
    pub app_path: Option<String>,
    pub file_exists: bool,
    pub file_info: Option<StorageInfo>,
    pub backups_count: usize,
    pub message: String,
}

/// The selected backend plus at-rest password sealing
pub struct ConnectionStore {
    backend: Box<dyn StorageBackend>,
    capabilities: Capabilities,
    cipher: Option<FieldCipher>,
    file_name: String,
}

impl ConnectionStore {
    pub fn new(preference: BackendPreference, capabilities: Capabilities) -> Self {
        Self::with_file_name(preference, capabilities, CONNECTIONS_FILE)
    }

    pub fn with_file_name(
        preference: BackendPreference,
        capabilities: Capabilities,
        file_name: &str,
    ) -> Self {
        let backend = StorageSelector::select(preference, &capabilities, file_name);
        Self {
            backend,
            capabilities,
            cipher: None,
            file_name: file_name.to_string(),
        }
    }

    /// Store with no persistence at all
    pub fn unavailable() -> Self {
        Self::new(BackendPreference::None, Capabilities::none())
    }

    pub fn with_cipher(mut self, cipher: Option<FieldCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn kind(&self) -> StorageKind {
        self.backend.kind()
    }

    pub fn is_available(&self) -> bool {
        self.backend.kind() != StorageKind::Unavailable
    }

    pub async fn load(&self) -> Vec<Connection> {
        let mut connections = self.backend.load().await;
        if let Some(cipher) = &self.cipher {
            cipher.open_passwords(&mut connections);
        }
        connections
    }

    pub async fn save(&self, connections: &[Connection]) -> Result<(), StorageError> {
        match &self.cipher {
            Some(cipher) => {
                let sealed = cipher.seal_passwords(connections)?;
                self.backend.save(&sealed).await
            }
            None => self.backend.save(connections).await,
        }
    }

    pub async fn backup(&self) -> Option<String> {
        self.backend.backup().await
    }

    pub async fn list_backups(&self) -> Vec<String> {
        self.backend.list_backups().await
    }

    pub async fn restore_backup(&self, name: &str) -> bool {
        self.backend.restore_backup(name).await
    }

    pub async fn info(&self) -> Option<StorageInfo> {
        self.backend.info().await
    }

    /// Application data directory, when a file bridge exists
    pub fn app_data_path(&self) -> Option<PathBuf> {
        self.capabilities
            .file_bridge
            .as_ref()
            .map(|bridge| bridge.app_data_path())
    }

    pub async fn status(&self) -> StorageStatus {
        let kind = self.backend.kind();
        let file_exists = self.backend.has_data().await;
        let file_info = self.backend.info().await;
        let backups_count = self.backend.list_backups().await.len();

        let message = match kind {
            StorageKind::File => format!("Using file storage at {}", self.backend.location()),
            StorageKind::Local => format!("Using local store ({})", self.backend.location()),
            StorageKind::Unavailable => {
                "No storage available; connections are kept in memory only".to_string()
            }
        };

        StorageStatus {
            available: self.is_available(),
            environment: kind,
            app_path: self.app_data_path().map(|p| p.display().to_string()),
            file_exists,
            file_info,
            backups_count,
            message,
        }
    }

    /// Copy connections from the local store into the data file
    ///
    /// Only runs when both capabilities exist, the local store holds data, and
    /// the file has not been written yet. Values are copied as stored, so
    /// sealed passwords stay sealed. Returns whether anything was migrated.
    pub async fn migrate_from_local(&self) -> Result<bool, StorageError> {
        let (Some(bridge), Some(store)) = (
            self.capabilities.file_bridge.clone(),
            self.capabilities.local_store.clone(),
        ) else {
            return Ok(false);
        };

        let file = FileBackend::with_file_name(bridge, &self.file_name);
        let local = LocalBackend::new(store);

        if !local.has_data().await || file.has_data().await {
            return Ok(false);
        }

        let connections = local.load().await;
        file.save(&connections).await?;
        tracing::info!(
            "Migrated {} connections from local store to {}",
            connections.len(),
            file.location()
        );
        Ok(true)
    }
}
