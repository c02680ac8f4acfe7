use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::models::timestamp;

/// Subdirectory holding backup copies
pub const BACKUP_DIR: &str = "backups";

/// Size and timestamps of a stored document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub location: String,
}

/// File-system capabilities offered by the desktop host
///
/// All names are relative to the application data directory.
#[async_trait]
pub trait FileBridge: Send + Sync {
    async fn exists(&self, name: &str) -> bool;

    async fn read_file(&self, name: &str) -> Result<String, StorageError>;

    /// Write a file, creating parent directories as needed
    async fn write_file(&self, name: &str, content: &str) -> Result<(), StorageError>;

    /// JSON files in a directory; an unreadable directory yields an empty list
    async fn list_files(&self, dir: &str) -> Vec<String>;

    async fn delete_file(&self, name: &str) -> bool;

    /// Copy a file into the backup directory and return the backup file name
    async fn backup(&self, name: &str) -> Result<String, StorageError>;

    fn app_data_path(&self) -> PathBuf;

    async fn file_info(&self, name: &str) -> Option<StorageInfo>;
}

/// Backup file name: `<stem>-backup-<timestamp with ':' and '.' replaced by '-'>.json`
pub fn backup_file_name(original: &str, at: &DateTime<Utc>) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    let stamp: String = timestamp::format(at)
        .chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect();
    format!("{}-backup-{}.json", stem, stamp)
}

/// Prefix shared by every backup of `original`
pub fn backup_prefix(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    format!("{}-backup-", stem)
}

/// `FileBridge` over a directory on the local file system
#[derive(Debug, Clone)]
pub struct AppDataDir {
    root: PathBuf,
}

impl AppDataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data and backup directories; `None` when the location is not writable
    pub async fn probe(root: impl Into<PathBuf>) -> Option<Self> {
        let dir = Self::new(root);
        match dir.initialize().await {
            Ok(()) => Some(dir),
            Err(e) => {
                tracing::warn!("Data directory {} unavailable: {}", dir.root.display(), e);
                None
            }
        }
    }

    pub async fn initialize(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::create_dir_all(self.root.join(BACKUP_DIR)).await?;
        tracing::info!("Data directory initialized: {}", self.root.display());
        Ok(())
    }

    /// Resolve a relative name inside the root, rejecting escapes
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(StorageError::InvalidPath(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileBridge for AppDataDir {
    async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read_file(&self, name: &str) -> Result<String, StorageError> {
        let path = self.resolve(name)?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, name: &str, content: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!("File written: {}", path.display());
        Ok(())
    }

    async fn list_files(&self, dir: &str) -> Vec<String> {
        let Ok(path) = self.resolve(dir) else {
            return Vec::new();
        };
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") {
                    files.push(name.to_string());
                }
            }
        }
        files
    }

    async fn delete_file(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => tokio::fs::remove_file(path).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn backup(&self, name: &str) -> Result<String, StorageError> {
        let content = self.read_file(name).await?;

        let base = backup_file_name(name, &timestamp::now());
        let mut file_name = base.clone();
        let mut attempt = 0;
        // Two backups in the same millisecond must not overwrite each other
        while self.exists(&format!("{}/{}", BACKUP_DIR, file_name)).await {
            attempt += 1;
            file_name = format!("{}-{}.json", base.trim_end_matches(".json"), attempt);
        }

        self.write_file(&format!("{}/{}", BACKUP_DIR, file_name), &content)
            .await?;
        tracing::info!("Backup created: {}", file_name);
        Ok(file_name)
    }

    fn app_data_path(&self) -> PathBuf {
        self.root.clone()
    }

    async fn file_info(&self, name: &str) -> Option<StorageInfo> {
        let path = self.resolve(name).ok()?;
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        let modified: DateTime<Utc> = metadata.modified().ok()?.into();
        // Birth time is not available on every file system
        let created: DateTime<Utc> = metadata.created().map(Into::into).unwrap_or(modified);

        Some(StorageInfo {
            size: metadata.len(),
            created_at: created,
            modified_at: modified,
            location: path.display().to_string(),
        })
    }
}
