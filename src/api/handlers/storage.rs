use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::connection::AppState;
use crate::api::middleware::AppError;
use crate::storage::StorageStatus;

pub async fn list_backups(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "backups": state.registry.list_backups().await
    }))
}

/// Copy the current connections document into the backup directory
pub async fn create_backup(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let name = state.registry.backup().await.ok_or_else(|| {
        AppError::BadRequest("Nothing to back up with the active storage".to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "backup": name })),
    ))
}

/// Restore a backup and reload the registry from it
pub async fn restore_backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.registry.restore_backup(&name).await {
        return Err(AppError::BadRequest(format!(
            "Backup {} could not be restored",
            name
        )));
    }

    let count = state.registry.get_all().await.len();
    Ok(Json(serde_json::json!({
        "restored": name,
        "connections": count,
    })))
}

pub async fn storage_status(State(state): State<AppState>) -> Json<StorageStatus> {
    Json(state.registry.storage_status().await)
}

/// Move local-store data into the data file
pub async fn migrate_storage(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let migrated = state.registry.migrate_storage().await?;
    Ok(Json(serde_json::json!({ "migrated": migrated })))
}
