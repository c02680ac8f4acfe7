use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{Connection, ConnectionFormData, ConnectionPatch, ConnectionType, TestResult};
use crate::services::ConnectionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConnectionsQuery {
    pub connection_type: Option<String>,
}

/// Passwords never leave the process through the API
fn redact(connections: Vec<Connection>) -> Vec<Connection> {
    connections.iter().map(Connection::without_password).collect()
}

/// List connections, optionally filtered by `connectionType`
pub async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let connections = match query.connection_type.as_deref() {
        Some(raw) => {
            let connection_type = raw
                .parse::<ConnectionType>()
                .map_err(AppError::BadRequest)?;
            state.registry.get_by_type(connection_type).await
        }
        None => state.registry.get_all().await,
    };

    Ok(Json(serde_json::json!({
        "connections": redact(connections)
    })))
}

/// Create a connection; the connectivity test must pass first
pub async fn create_connection(
    State(state): State<AppState>,
    Json(mut payload): Json<ConnectionFormData>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // Creation always goes through the create path
    payload.id = None;
    let connection = state.registry.save(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "connection": connection.without_password()
        })),
    ))
}

/// Get a connection by ID
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let connection = state
        .registry
        .get_by_id(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))?;

    Ok(Json(serde_json::json!({
        "connection": connection.without_password()
    })))
}

/// Apply a partial update; a blank password keeps the stored one
pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ConnectionPatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let connection = state.registry.update(&id, patch).await?;

    Ok(Json(serde_json::json!({
        "connection": connection.without_password()
    })))
}

/// Delete a connection
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.registry.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Connection {} not found", id)))
    }
}

/// Copy a connection under a new id
pub async fn duplicate_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let copy = state
        .registry
        .duplicate(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "connection": copy.without_password()
        })),
    ))
}

/// Re-test a stored connection and record the outcome
pub async fn retest_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TestResult>, AppError> {
    Ok(Json(state.registry.retest(&id).await?))
}

/// Test unsaved form data
pub async fn test_connection(
    State(state): State<AppState>,
    Json(payload): Json<ConnectionFormData>,
) -> Json<TestResult> {
    Json(state.registry.test(&payload).await)
}

pub async fn connection_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.stats().await)
}

/// Reload the list from storage
pub async fn refresh_connections(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connections = state.registry.refresh().await;
    Json(serde_json::json!({
        "connections": redact(connections)
    }))
}

/// Remove every connection (a backup is taken first)
pub async fn clear_connections(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.registry.clear_all().await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// Download the export envelope
pub async fn export_connections(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.registry.export_connections().await?;
    let file_name = format!(
        "connections-export-{}.json",
        chrono::Utc::now().format("%Y-%m-%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response())
}

/// Import an envelope document sent as the raw request body
pub async fn import_connections(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = state.registry.import_connections(&body).await?;
    let imported = redact(report.imported);

    Ok(Json(serde_json::json!({
        "imported": imported,
        "skipped": report.skipped,
    })))
}
