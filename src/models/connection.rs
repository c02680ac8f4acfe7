use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::timestamp::{self, iso8601, LastTested};

/// A saved database connection profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    pub connection_type: ConnectionType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub status: ConnectionStatus,
    pub last_tested: LastTested,
    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Whether another name collides with this connection's name
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }

    /// Bump `updated_at`, keeping it monotonic
    pub fn touch(&mut self) {
        self.updated_at = timestamp::after(self.updated_at);
    }

    pub fn mark_testing(&mut self) {
        self.status = ConnectionStatus::Testing;
        self.touch();
    }

    /// Record the outcome of a finished test
    pub fn mark_tested(&mut self, success: bool) {
        self.status = if success {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        self.last_tested = self.last_tested.next();
        self.touch();
    }

    /// Copy with a fresh id and `" (Copy)"` name suffix, never connected
    pub fn duplicate(&self) -> Self {
        let now = timestamp::now();
        Self {
            id: Self::generate_id(),
            name: format!("{} (Copy)", self.name),
            status: ConnectionStatus::Disconnected,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Copy safe to hand out of the process: password cleared
    pub fn without_password(&self) -> Self {
        Self {
            password: String::new(),
            ..self.clone()
        }
    }
}

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseType {
    #[default]
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "SQLite")]
    Sqlite,
    #[serde(rename = "SQL Server")]
    SqlServer,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 4] = [
        DatabaseType::MySql,
        DatabaseType::PostgreSql,
        DatabaseType::Sqlite,
        DatabaseType::SqlServer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::MySql => "MySQL",
            DatabaseType::PostgreSql => "PostgreSQL",
            DatabaseType::Sqlite => "SQLite",
            DatabaseType::SqlServer => "SQL Server",
        }
    }

    /// Default port; SQLite has none and uses 0
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::MySql => 3306,
            DatabaseType::PostgreSql => 5432,
            DatabaseType::SqlServer => 1433,
            DatabaseType::Sqlite => 0,
        }
    }

    /// File-based engines need neither host nor credentials
    pub fn is_file_based(&self) -> bool {
        matches!(self, DatabaseType::Sqlite)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(DatabaseType::MySql),
            "postgresql" | "postgres" => Ok(DatabaseType::PostgreSql),
            "sqlite" => Ok(DatabaseType::Sqlite),
            "sql server" | "sqlserver" | "mssql" => Ok(DatabaseType::SqlServer),
            _ => Err(format!("Unsupported database type: {}", s)),
        }
    }
}

/// Which side of a pipeline a connection feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Source,
    Destination,
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(ConnectionType::Source),
            "destination" => Ok(ConnectionType::Destination),
            _ => Err(format!("Unknown connection type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Testing,
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "testing" => Ok(ConnectionStatus::Testing),
            _ => Err(format!("Unknown connection status: {}", s)),
        }
    }
}

/// Create/update payload coming from the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFormData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub db_type: DatabaseType,
    #[serde(default)]
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub host: String,
    /// Missing or zero means "use the default port for the type"
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ConnectionFormData {
    /// Port the record will carry once saved
    ///
    /// Only meaningful after validation: out-of-range values fall back to the default.
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port != 0 => {
                u16::try_from(port).unwrap_or_else(|_| self.db_type.default_port())
            }
            _ => self.db_type.default_port(),
        }
    }

    /// Merge a partial update on top of this form
    pub fn apply(mut self, patch: ConnectionPatch) -> Self {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(db_type) = patch.db_type {
            self.db_type = db_type;
        }
        if let Some(connection_type) = patch.connection_type {
            self.connection_type = connection_type;
        }
        if let Some(host) = patch.host {
            self.host = host;
        }
        if let Some(port) = patch.port {
            self.port = Some(port);
        }
        if let Some(database) = patch.database {
            self.database = database;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        // Blank password keeps the stored one
        if let Some(password) = patch.password.filter(|p| !p.is_empty()) {
            self.password = password;
        }
        self
    }
}

impl From<&Connection> for ConnectionFormData {
    fn from(conn: &Connection) -> Self {
        Self {
            id: Some(conn.id.clone()),
            name: conn.name.clone(),
            db_type: conn.db_type,
            connection_type: conn.connection_type,
            host: conn.host.clone(),
            port: Some(i64::from(conn.port)),
            database: conn.database.clone(),
            username: conn.username.clone(),
            password: conn.password.clone(),
        }
    }
}

/// Partial update payload; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub db_type: Option<DatabaseType>,
    pub connection_type: Option<ConnectionType>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Failure categories reported by a connection test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestErrorCode {
    Validation,
    Timeout,
    AuthFailed,
    HostNotFound,
    DatabaseNotFound,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl TestErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestErrorCode::Validation => "VALIDATION",
            TestErrorCode::Timeout => "TIMEOUT",
            TestErrorCode::AuthFailed => "AUTH_FAILED",
            TestErrorCode::HostNotFound => "HOST_NOT_FOUND",
            TestErrorCode::DatabaseNotFound => "DATABASE_NOT_FOUND",
            TestErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for TestErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a connection test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<TestErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl TestResult {
    pub fn success(latency_ms: u64) -> Self {
        Self {
            success: true,
            message: "Connection established successfully".to_string(),
            error_code: None,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failure(message: impl Into<String>, error_code: Option<TestErrorCode>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
            latency_ms: None,
        }
    }
}
