// Field-level encryption for connection passwords at rest.
//
// Disabled unless a key is configured; plaintext values written before the key
// was set keep loading unchanged.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::models::Connection;

/// Prefix marking an encrypted field value
pub const SEALED_PREFIX: &str = "enc:v1:";

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Encryption error: {0}")]
    Encrypt(String),

    #[error("Decryption error: {0}")]
    Decrypt(String),

    #[error("Base64 decode error: {0}")]
    Decode(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// AES-256-GCM cipher for single string fields
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from a base64-encoded 32-byte key
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Decode(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::new(key))
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    /// Encrypt a value as `enc:v1:base64(nonce ‖ ciphertext+tag)`
    ///
    /// Empty values are returned unchanged. Any other value is sealed, even one
    /// that already carries the prefix, so `open` always returns it verbatim.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(plaintext.to_string());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new((&self.key).into());
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", SEALED_PREFIX, STANDARD.encode(&combined)))
    }

    /// Decrypt a sealed value; plaintext values pass through
    pub fn open(&self, value: &str) -> Result<String, CryptoError> {
        let Some(encoded) = value.strip_prefix(SEALED_PREFIX) else {
            return Ok(value.to_string());
        };

        let data = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decode(e.to_string()))?;

        if data.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt(
                "Ciphertext too short (< 12 bytes)".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new((&self.key).into());
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }

    /// Copies of `connections` with every password sealed
    pub fn seal_passwords(&self, connections: &[Connection]) -> Result<Vec<Connection>, CryptoError> {
        connections
            .iter()
            .map(|conn| {
                Ok(Connection {
                    password: self.seal(&conn.password)?,
                    ..conn.clone()
                })
            })
            .collect()
    }

    /// Open every password in place
    ///
    /// A value that cannot be decrypted (wrong key, corruption) is cleared so a
    /// ciphertext is never mistaken for a password.
    pub fn open_passwords(&self, connections: &mut [Connection]) {
        for conn in connections.iter_mut() {
            match self.open(&conn.password) {
                Ok(plain) => conn.password = plain,
                Err(e) => {
                    tracing::warn!(connection_id = %conn.id, "Failed to decrypt stored password: {}", e);
                    conn.password.clear();
                }
            }
        }
    }
}
