use serde::Serialize;

use super::connection::{Connection, ConnectionStatus, ConnectionType, DatabaseType};

/// Aggregate counts over the registry, used by dashboard summaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub testing: usize,
    pub source: usize,
    pub destination: usize,
    pub by_type: TypeBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeBreakdown {
    #[serde(rename = "MySQL")]
    pub mysql: usize,
    #[serde(rename = "PostgreSQL")]
    pub postgresql: usize,
    #[serde(rename = "SQLite")]
    pub sqlite: usize,
    #[serde(rename = "SQL Server")]
    pub sql_server: usize,
}

impl ConnectionStats {
    pub fn from_connections(connections: &[Connection]) -> Self {
        let mut stats = Self {
            total: connections.len(),
            ..Default::default()
        };

        for conn in connections {
            match conn.status {
                ConnectionStatus::Connected => stats.connected += 1,
                ConnectionStatus::Disconnected => stats.disconnected += 1,
                ConnectionStatus::Testing => stats.testing += 1,
            }
            match conn.connection_type {
                ConnectionType::Source => stats.source += 1,
                ConnectionType::Destination => stats.destination += 1,
            }
            match conn.db_type {
                DatabaseType::MySql => stats.by_type.mysql += 1,
                DatabaseType::PostgreSql => stats.by_type.postgresql += 1,
                DatabaseType::Sqlite => stats.by_type.sqlite += 1,
                DatabaseType::SqlServer => stats.by_type.sql_server += 1,
            }
        }

        stats
    }
}
