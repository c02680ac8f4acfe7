use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::connection::AppState;
use crate::api::handlers::{connection, storage};
use crate::services::ConnectionRegistry;

/// Create router with application state
pub fn create_router_with_state(registry: Arc<ConnectionRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/connections",
            get(connection::list_connections)
                .post(connection::create_connection)
                .delete(connection::clear_connections),
        )
        .route("/api/connections/stats", get(connection::connection_stats))
        .route("/api/connections/test", post(connection::test_connection))
        .route("/api/connections/refresh", post(connection::refresh_connections))
        .route("/api/connections/export", get(connection::export_connections))
        .route("/api/connections/import", post(connection::import_connections))
        .route(
            "/api/connections/{id}",
            get(connection::get_connection)
                .put(connection::update_connection)
                .delete(connection::delete_connection),
        )
        .route(
            "/api/connections/{id}/duplicate",
            post(connection::duplicate_connection),
        )
        .route(
            "/api/connections/{id}/test",
            post(connection::retest_connection),
        )
        .route(
            "/api/storage/backups",
            get(storage::list_backups).post(storage::create_backup),
        )
        .route(
            "/api/storage/backups/{name}/restore",
            post(storage::restore_backup),
        )
        .route("/api/storage/status", get(storage::storage_status))
        .route("/api/storage/migrate", post(storage::migrate_storage))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
