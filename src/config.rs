use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::storage::BackendPreference;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tester: TesterConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendPreference,
    /// Application data directory holding the connections file and backups
    pub data_dir: PathBuf,
    /// SQLite file backing the local key/value store
    pub local_db: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TesterConfig {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Draw simulated failures (timeouts, auth errors, ...)
    pub failure_injection: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Base64 32-byte key; passwords are stored in plaintext when unset
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("storage.backend", "auto")?
            .set_default("storage.data_dir", "./data")?
            .set_default("storage.local_db", "./data/local-store.db")?
            .set_default("storage.file_name", "connections.json")?
            .set_default("tester.min_latency_ms", 1000)?
            .set_default("tester.max_latency_ms", 3000)?
            .set_default("tester.failure_injection", true)?
            .set_default("tester.timeout_secs", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            builder = builder.set_override("storage.backend", backend.to_lowercase())?;
        }

        if let Ok(data_dir) = env::var("DATA_DIR") {
            builder = builder.set_override("storage.data_dir", data_dir)?;
        }

        if let Ok(local_db) = env::var("LOCAL_STORE_PATH") {
            builder = builder.set_override("storage.local_db", local_db)?;
        }

        if let Ok(min) = env::var("TEST_MIN_LATENCY_MS") {
            builder = builder.set_override("tester.min_latency_ms", min.parse::<u64>().unwrap_or(1000))?;
        }

        if let Ok(max) = env::var("TEST_MAX_LATENCY_MS") {
            builder = builder.set_override("tester.max_latency_ms", max.parse::<u64>().unwrap_or(3000))?;
        }

        if let Ok(enabled) = env::var("TEST_FAILURE_INJECTION") {
            builder = builder.set_override(
                "tester.failure_injection",
                !matches!(enabled.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"),
            )?;
        }

        if let Ok(timeout) = env::var("TEST_TIMEOUT_SECS") {
            builder = builder.set_override("tester.timeout_secs", timeout.parse::<u64>().unwrap_or(10))?;
        }

        if let Ok(key) = env::var("CONNECTIONS_ENCRYPTION_KEY") {
            if !key.trim().is_empty() {
                builder = builder.set_override("security.encryption_key", Some(key))?;
            }
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
