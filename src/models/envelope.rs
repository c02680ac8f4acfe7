use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::Connection;
use super::timestamp::{self, iso8601};

/// Format version written into every envelope
pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Top-level JSON document wrapping the connection list
///
/// Used for the primary store, backups, and the export/import file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsEnvelope {
    pub connections: Vec<Connection>,
    #[serde(with = "iso8601")]
    pub last_updated: DateTime<Utc>,
    pub version: String,
}

impl ConnectionsEnvelope {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections,
            last_updated: timestamp::now(),
            version: ENVELOPE_VERSION.to_string(),
        }
    }
}
