use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use connection_registry::api;
use connection_registry::config::Config;
use connection_registry::crypto::FieldCipher;
use connection_registry::services::{ConnectionRegistry, SimulatedTester};
use connection_registry::storage::{
    AppDataDir, Capabilities, ConnectionStore, FileBridge, KeyValueStore, SqliteKeyValueStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    info!("Starting server on {}", config.server_address());

    // Probe host capabilities
    let mut capabilities = Capabilities::none();
    if let Some(dir) = AppDataDir::probe(&config.storage.data_dir).await {
        capabilities = capabilities.with_file_bridge(Arc::new(dir) as Arc<dyn FileBridge>);
    }
    match SqliteKeyValueStore::new(&config.storage.local_db).await {
        Ok(store) => {
            capabilities = capabilities.with_local_store(Arc::new(store) as Arc<dyn KeyValueStore>);
        }
        Err(e) => warn!("Local store unavailable: {}", e),
    }

    let cipher = match config.security.encryption_key.as_deref() {
        Some(key) => {
            info!("Password encryption at rest enabled");
            Some(FieldCipher::from_base64_key(key).context("Invalid CONNECTIONS_ENCRYPTION_KEY")?)
        }
        None => None,
    };

    let store = ConnectionStore::with_file_name(
        config.storage.backend,
        capabilities,
        &config.storage.file_name,
    )
    .with_cipher(cipher);

    match store.migrate_from_local().await {
        Ok(true) => info!("Migrated connections from the local store"),
        Ok(false) => {}
        Err(e) => error!("Migration from the local store failed: {}", e),
    }

    let tester = Arc::new(SimulatedTester::from_config(&config.tester));
    let registry = Arc::new(
        ConnectionRegistry::new(Arc::new(store), tester)
            .with_test_timeout(Duration::from_secs(config.tester.timeout_secs)),
    );
    registry.ensure_loaded().await;

    // Create router with state
    let app: Router = api::routes::create_router_with_state(registry);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
