// Import/export of the connection list as a portable JSON envelope

use serde::Serialize;

use super::serializer;
use crate::error::RegistryError;
use crate::models::Connection;

/// Outcome of applying an import file to the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<Connection>,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub name: String,
    pub reason: String,
}

/// Serialize connections for export: pretty-printed envelope, passwords cleared
pub fn export_connections(connections: &[Connection]) -> Result<String, RegistryError> {
    let envelope = serializer::to_export_envelope(connections);
    serde_json::to_string_pretty(&envelope)
        .map_err(|e| RegistryError::Storage(e.into()))
}

/// Parse an import file into sanitized connections
///
/// Unknown and missing fields are defaulted. The document itself must be an
/// envelope with a `connections` array, and each element must be an object;
/// otherwise the whole import is rejected.
pub fn import_connections(content: &str) -> Result<Vec<Connection>, RegistryError> {
    let records =
        serializer::envelope_records(content).map_err(|e| RegistryError::Import(e.to_string()))?;

    let connections = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            serializer::sanitize(record)
                .map_err(|e| RegistryError::Import(format!("record {}: {}", index, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("Validated {} connections for import", connections.len());
    Ok(connections)
}
