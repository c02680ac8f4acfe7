use thiserror::Error;

use crate::crypto::CryptoError;
use crate::models::TestErrorCode;

/// Failures inside a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Encryption error: {0}")]
    Cipher(#[from] CryptoError),

    #[error("Invalid stored data: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

/// A persisted or imported document that cannot become a `Connection`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a \"connections\" array")]
    MissingConnections,

    #[error("connection record must be a JSON object")]
    NotAnObject,
}

/// Errors surfaced by the connection registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("VALIDATION:{0}")]
    Validation(String),

    #[error("Connection test failed: {message}")]
    TestFailed { code: TestErrorCode, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RegistryError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_is_tagged() {
        let err = RegistryError::Validation("Host is required".to_string());
        assert_eq!(err.to_string(), "VALIDATION:Host is required");
        assert!(err.is_validation());
    }

    #[test]
    fn test_storage_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RegistryError = StorageError::from(io).into();
        assert!(err.to_string().contains("denied"));
    }
}
