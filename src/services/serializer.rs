// Connection Serializer
//
// Single point of defensive defaulting: every record read from storage or an
// import file passes through `sanitize`, so partial or corrupt data never
// reaches the registry as a half-built `Connection`.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::models::timestamp::{self, LastTested};
use crate::models::{
    Connection, ConnectionStatus, ConnectionType, ConnectionsEnvelope, DatabaseType,
};

/// Name given to records stored without one
pub const DEFAULT_CONNECTION_NAME: &str = "Unnamed connection";

/// Host given to records stored without one
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for a database type name; unknown names use the MySQL port
pub fn default_port_for(type_name: &str) -> u16 {
    type_name
        .parse::<DatabaseType>()
        .unwrap_or_default()
        .default_port()
}

/// Normalize a decoded JSON record into a well-formed `Connection`
pub fn sanitize(value: &Value) -> Result<Connection, DecodeError> {
    let record = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let db_type = match text(record, "type") {
        Some(name) => name.parse::<DatabaseType>().unwrap_or_else(|_| {
            tracing::warn!("Unsupported database type {:?}, treating record as MySQL", name);
            DatabaseType::default()
        }),
        None => DatabaseType::default(),
    };

    let connection_type = text(record, "connectionType")
        .and_then(|s| s.parse::<ConnectionType>().ok())
        .unwrap_or_default();

    let status = text(record, "status")
        .and_then(|s| s.parse::<ConnectionStatus>().ok())
        .unwrap_or_default();

    let now = timestamp::now();

    Ok(Connection {
        id: text(record, "id").unwrap_or_else(Connection::generate_id),
        name: text(record, "name").unwrap_or_else(|| DEFAULT_CONNECTION_NAME.to_string()),
        db_type,
        connection_type,
        host: text(record, "host").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: port(record).unwrap_or_else(|| db_type.default_port()),
        database: text(record, "database").unwrap_or_default(),
        username: text(record, "username").unwrap_or_default(),
        password: raw_text(record, "password").unwrap_or_default(),
        status,
        last_tested: text(record, "lastTested")
            .map(|s| LastTested::parse_lenient(&s))
            .unwrap_or_default(),
        created_at: text(record, "createdAt")
            .and_then(|s| timestamp::parse(&s))
            .unwrap_or(now),
        updated_at: text(record, "updatedAt")
            .and_then(|s| timestamp::parse(&s))
            .unwrap_or(now),
    })
}

/// The record a store round trip yields for `connection`
///
/// Whatever the registry keeps in memory goes through here first, so a reload
/// returns exactly what was saved.
pub fn normalize(connection: &Connection) -> Result<Connection, DecodeError> {
    let value =
        serde_json::to_value(connection).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    sanitize(&value)
}

/// Non-empty string field, trimmed
fn text(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty string field kept verbatim (passwords may carry meaningful whitespace)
fn raw_text(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Port as a number or numeric string; zero or out-of-range values are treated as missing
fn port(record: &Map<String, Value>) -> Option<u16> {
    let raw = match record.get("port")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.fract() != 0.0 || raw < 1.0 || raw > f64::from(u16::MAX) {
        return None;
    }
    Some(raw as u16)
}

/// Raw records of an envelope document
///
/// Fails unless the document is JSON with a `connections` array.
pub fn envelope_records(content: &str) -> Result<Vec<Value>, DecodeError> {
    let document: Value =
        serde_json::from_str(content).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match document.get("connections") {
        Some(Value::Array(records)) => Ok(records.clone()),
        _ => Err(DecodeError::MissingConnections),
    }
}

/// Decode a stored envelope, skipping records that cannot be sanitized
pub fn decode_stored(content: &str) -> Result<Vec<Connection>, DecodeError> {
    let records = envelope_records(content)?;
    let total = records.len();

    let connections: Vec<Connection> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match sanitize(record) {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!("Skipping stored connection #{}: {}", index, e);
                None
            }
        })
        .collect();

    if connections.len() < total {
        tracing::warn!(
            "Loaded {} of {} stored connections",
            connections.len(),
            total
        );
    }

    Ok(connections)
}

/// Envelope for the primary store (passwords kept)
pub fn encode_stored(connections: &[Connection], pretty: bool) -> Result<String, serde_json::Error> {
    let envelope = ConnectionsEnvelope::new(connections.to_vec());
    if pretty {
        serde_json::to_string_pretty(&envelope)
    } else {
        serde_json::to_string(&envelope)
    }
}

/// Envelope for export: every password cleared
pub fn to_export_envelope(connections: &[Connection]) -> ConnectionsEnvelope {
    ConnectionsEnvelope::new(connections.iter().map(Connection::without_password).collect())
}
