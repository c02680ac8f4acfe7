use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, OnceCell, RwLock};

use super::serializer;
use super::tester::{ConnectionTester, TestFailure};
use super::transfer::{self, ImportReport, SkippedRecord};
use crate::error::{RegistryError, StorageError};
use crate::models::{
    timestamp, Connection, ConnectionFormData, ConnectionPatch, ConnectionStats,
    ConnectionStatus, ConnectionType, LastTested, TestErrorCode, TestResult,
};
use crate::storage::{ConnectionStore, StorageStatus};
use crate::validation::ConnectionValidator;

/// Upper bound on a single connectivity test
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CAPACITY: usize = 64;

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    Saved { id: String },
    Deleted { id: String },
    StatusChanged { id: String, status: ConnectionStatus },
    Reloaded { count: usize },
}

/// Authoritative in-memory list of connections, persisted on every change
pub struct ConnectionRegistry {
    store: Arc<ConnectionStore>,
    tester: Arc<dyn ConnectionTester>,
    test_timeout: Duration,
    connections: RwLock<Vec<Connection>>,
    loaded: OnceCell<()>,
    // Serializes mutations so check-then-write sequences cannot interleave
    write_gate: Mutex<()>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<ConnectionStore>, tester: Arc<dyn ConnectionTester>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            tester,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            connections: RwLock::new(Vec::new()),
            loaded: OnceCell::new(),
            write_gate: Mutex::new(()),
            events,
        }
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Load from storage once; concurrent first callers share the same load
    pub async fn ensure_loaded(&self) {
        self.loaded
            .get_or_init(|| async {
                let connections = self.store.load().await;
                tracing::info!("Connection registry loaded {} connections", connections.len());
                *self.connections.write().await = connections;
            })
            .await;
    }

    /// Replace memory with what storage currently holds
    pub async fn refresh(&self) -> Vec<Connection> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        let connections = self.store.load().await;
        let count = connections.len();
        *self.connections.write().await = connections.clone();
        tracing::info!("Connection registry reloaded {} connections", count);
        self.emit(RegistryEvent::Reloaded { count });
        connections
    }

    pub async fn get_all(&self) -> Vec<Connection> {
        self.ensure_loaded().await;
        self.connections.read().await.clone()
    }

    pub async fn get_by_type(&self, connection_type: ConnectionType) -> Vec<Connection> {
        self.ensure_loaded().await;
        self.connections
            .read()
            .await
            .iter()
            .filter(|c| c.connection_type == connection_type)
            .cloned()
            .collect()
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Connection> {
        self.ensure_loaded().await;
        self.find(id).await
    }

    async fn find(&self, id: &str) -> Option<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn stats(&self) -> ConnectionStats {
        self.ensure_loaded().await;
        ConnectionStats::from_connections(&self.connections.read().await)
    }

    /// Create or update a connection from form data
    ///
    /// A form whose `id` matches a stored connection updates it; anything else
    /// creates a new connection with a fresh id.
    pub async fn save(&self, form: ConnectionFormData) -> Result<Connection, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;
        self.save_locked(form).await
    }

    /// Merge a partial update onto an existing connection
    pub async fn update(&self, id: &str, patch: ConnectionPatch) -> Result<Connection, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        let existing = self
            .find(id)
            .await
            .ok_or_else(|| RegistryError::NotFound(format!("Connection {} not found", id)))?;

        let mut form = ConnectionFormData::from(&existing).apply(patch);
        form.id = Some(existing.id);
        self.save_locked(form).await
    }

    async fn save_locked(&self, mut form: ConnectionFormData) -> Result<Connection, RegistryError> {
        form.name = form.name.trim().to_string();
        form.host = form.host.trim().to_string();
        form.database = form.database.trim().to_string();
        form.username = form.username.trim().to_string();

        let existing = match form.id.as_deref() {
            Some(id) => self.find(id).await,
            None => None,
        };

        if let Some(existing) = &existing {
            if form.password.is_empty() {
                form.password = existing.password.clone();
            }
        }

        ConnectionValidator::validate(&form)?;
        self.ensure_unique_name(&form.name, existing.as_ref()).await?;

        let needs_test = existing
            .as_ref()
            .map_or(true, |existing| details_changed(existing, &form));

        if needs_test {
            tracing::debug!("Testing connection {}", form.name);
            self.run_test(&form)
                .await
                .map_err(|failure| RegistryError::TestFailed {
                    code: failure.code,
                    message: failure.message,
                })?;
        }

        let connection = match &existing {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.name = form.name.clone();
                updated.db_type = form.db_type;
                updated.connection_type = form.connection_type;
                updated.host = form.host.clone();
                updated.port = form.effective_port();
                updated.database = form.database.clone();
                updated.username = form.username.clone();
                updated.password = form.password.clone();
                if needs_test {
                    updated.mark_tested(true);
                } else {
                    updated.touch();
                }
                updated
            }
            None => {
                let now = timestamp::now();
                Connection {
                    id: Connection::generate_id(),
                    name: form.name.clone(),
                    db_type: form.db_type,
                    connection_type: form.connection_type,
                    host: form.host.clone(),
                    port: form.effective_port(),
                    database: form.database.clone(),
                    username: form.username.clone(),
                    password: form.password.clone(),
                    status: ConnectionStatus::Connected,
                    last_tested: LastTested::At(now),
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        // Keep memory identical to what the next load decodes
        let connection = serializer::normalize(&connection).map_err(StorageError::from)?;

        let stored = connection.clone();
        self.commit(move |list| match list.iter().position(|c| c.id == stored.id) {
            Some(index) => list[index] = stored,
            None => list.push(stored),
        })
        .await?;

        tracing::info!(
            connection_id = %connection.id,
            "Connection {} {}",
            connection.name,
            if existing.is_some() { "updated" } else { "created" }
        );
        self.emit(RegistryEvent::Saved {
            id: connection.id.clone(),
        });
        Ok(connection)
    }

    /// Reject a name already used by another connection (case-insensitive)
    ///
    /// An update that keeps its own name is not re-checked.
    async fn ensure_unique_name(
        &self,
        name: &str,
        existing: Option<&Connection>,
    ) -> Result<(), RegistryError> {
        if existing.is_some_and(|e| e.name == name) {
            return Ok(());
        }
        let exclude = existing.map(|e| e.id.as_str());
        let taken = self
            .connections
            .read()
            .await
            .iter()
            .any(|c| Some(c.id.as_str()) != exclude && c.has_name(name));

        if taken {
            return Err(RegistryError::Validation(format!(
                "A connection named \"{}\" already exists",
                name
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        if self.find(id).await.is_none() {
            return Ok(false);
        }

        self.commit(|list| list.retain(|c| c.id != id)).await?;
        tracing::info!(connection_id = %id, "Connection deleted");
        self.emit(RegistryEvent::Deleted { id: id.to_string() });
        Ok(true)
    }

    /// Copy a connection under a new id; the copy starts disconnected
    pub async fn duplicate(&self, id: &str) -> Result<Option<Connection>, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        let Some(original) = self.find(id).await else {
            return Ok(None);
        };

        let copy = original.duplicate();
        let stored = copy.clone();
        self.commit(move |list| list.push(stored)).await?;

        tracing::info!(connection_id = %copy.id, "Connection {} duplicated from {}", copy.name, id);
        self.emit(RegistryEvent::Saved { id: copy.id.clone() });
        Ok(Some(copy))
    }

    /// Validate and test form data without persisting anything
    pub async fn test(&self, form: &ConnectionFormData) -> TestResult {
        if let Err(err) = ConnectionValidator::validate(form) {
            return TestResult::failure(
                ConnectionValidator::message(&err),
                Some(TestErrorCode::Validation),
            );
        }

        match self.run_test(form).await {
            Ok(latency_ms) => TestResult::success(latency_ms),
            Err(failure) => TestResult::failure(failure.message, Some(failure.code)),
        }
    }

    /// Re-test a stored connection, recording the outcome
    ///
    /// The `testing` status is persisted and broadcast before the test runs.
    pub async fn retest(&self, id: &str) -> Result<TestResult, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        let Some(connection) = self.find(id).await else {
            return Ok(TestResult::failure("Connection not found", None));
        };

        self.commit(|list| {
            if let Some(conn) = list.iter_mut().find(|c| c.id == id) {
                conn.mark_testing();
            }
        })
        .await?;
        self.emit(RegistryEvent::StatusChanged {
            id: id.to_string(),
            status: ConnectionStatus::Testing,
        });

        let result = self.test(&ConnectionFormData::from(&connection)).await;

        let status = self
            .commit(|list| {
                list.iter_mut().find(|c| c.id == id).map(|conn| {
                    conn.mark_tested(result.success);
                    conn.status
                })
            })
            .await?
            .unwrap_or_default();

        tracing::info!(
            connection_id = %id,
            "Connection {} retested: {}",
            connection.name,
            if result.success { "ok" } else { result.message.as_str() }
        );
        self.emit(RegistryEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
        Ok(result)
    }

    /// Remove every connection after taking a backup; returns how many were removed
    pub async fn clear_all(&self) -> Result<usize, RegistryError> {
        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        if let Some(name) = self.store.backup().await {
            tracing::info!("Backup {} created before clearing connections", name);
        }

        let removed = self
            .commit(|list| {
                let count = list.len();
                list.clear();
                count
            })
            .await?;

        tracing::info!("Cleared {} connections", removed);
        self.emit(RegistryEvent::Reloaded { count: 0 });
        Ok(removed)
    }

    /// Add the connections of an import file
    ///
    /// Records keep their sanitized status and are not tested. Name clashes are
    /// skipped and reported; a taken id is replaced with a fresh one.
    pub async fn import_connections(&self, content: &str) -> Result<ImportReport, RegistryError> {
        let incoming = transfer::import_connections(content)?;

        self.ensure_loaded().await;
        let _gate = self.write_gate.lock().await;

        if let Some(name) = self.store.backup().await {
            tracing::info!("Backup {} created before import", name);
        }

        let mut report = ImportReport::default();
        {
            let current = self.connections.read().await;
            for mut conn in incoming {
                let clash = current
                    .iter()
                    .chain(report.imported.iter())
                    .any(|c| c.has_name(&conn.name));
                if clash {
                    report.skipped.push(SkippedRecord {
                        reason: format!("A connection named \"{}\" already exists", conn.name),
                        name: conn.name,
                    });
                    continue;
                }

                let id_taken = current
                    .iter()
                    .chain(report.imported.iter())
                    .any(|c| c.id == conn.id);
                if id_taken {
                    conn.id = Connection::generate_id();
                }
                report.imported.push(conn);
            }
        }

        if !report.imported.is_empty() {
            let added = report.imported.clone();
            self.commit(move |list| list.extend(added)).await?;
        }

        tracing::info!(
            "Imported {} connections ({} skipped)",
            report.imported.len(),
            report.skipped.len()
        );
        for conn in &report.imported {
            self.emit(RegistryEvent::Saved { id: conn.id.clone() });
        }
        Ok(report)
    }

    /// Export document of every connection, passwords cleared
    pub async fn export_connections(&self) -> Result<String, RegistryError> {
        self.ensure_loaded().await;
        transfer::export_connections(&self.connections.read().await)
    }

    pub async fn backup(&self) -> Option<String> {
        self.store.backup().await
    }

    pub async fn list_backups(&self) -> Vec<String> {
        self.store.list_backups().await
    }

    /// Restore a backup and reload memory from it
    pub async fn restore_backup(&self, name: &str) -> bool {
        let restored = {
            let _gate = self.write_gate.lock().await;
            self.store.restore_backup(name).await
        };
        if restored {
            self.refresh().await;
        }
        restored
    }

    pub async fn storage_status(&self) -> StorageStatus {
        self.store.status().await
    }

    /// Copy local-store data into the data file when the file is missing
    pub async fn migrate_storage(&self) -> Result<bool, RegistryError> {
        let migrated = {
            let _gate = self.write_gate.lock().await;
            self.store.migrate_from_local().await?
        };
        if migrated {
            self.refresh().await;
        }
        Ok(migrated)
    }

    /// Run the tester under the configured timeout; returns the latency in ms
    async fn run_test(&self, form: &ConnectionFormData) -> Result<u64, TestFailure> {
        let started = Instant::now();
        match tokio::time::timeout(self.test_timeout, self.tester.check(form)).await {
            Ok(Ok(())) => Ok(started.elapsed().as_millis() as u64),
            Ok(Err(failure)) => Err(failure),
            Err(_) => Err(TestFailure::new(
                TestErrorCode::Timeout,
                format!(
                    "Connection test timed out after {} ms",
                    self.test_timeout.as_millis()
                ),
            )),
        }
    }

    /// Apply a mutation and persist it; memory is rolled back if persisting fails
    async fn commit<F, R>(&self, mutate: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut Vec<Connection>) -> R,
    {
        let mut list = self.connections.write().await;
        let previous = list.clone();
        let outcome = mutate(&mut list);

        if let Err(e) = self.store.save(&list).await {
            tracing::error!("Failed to persist connections: {}", e);
            *list = previous;
            return Err(e.into());
        }
        Ok(outcome)
    }
}

/// Whether fields that affect reachability differ from the stored record
fn details_changed(existing: &Connection, form: &ConnectionFormData) -> bool {
    existing.host != form.host
        || existing.port != form.effective_port()
        || existing.database != form.database
        || existing.username != form.username
        || existing.password != form.password
        || existing.db_type != form.db_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;
    use crate::services::tester::SimulatedTester;
    use crate::storage::{
        AppDataDir, BackendPreference, Capabilities, FileBridge, KeyValueStore,
        MemoryKeyValueStore, CONNECTIONS_FILE,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Tester that fails when told to and counts calls
    #[derive(Default)]
    struct ScriptedTester {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionTester for ScriptedTester {
        async fn check(&self, _form: &ConnectionFormData) -> Result<(), TestFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(TestFailure::new(TestErrorCode::AuthFailed, "Authentication failed"))
            } else {
                Ok(())
            }
        }
    }

    /// Key/value store whose writes can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKeyValueStore,
        broken: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_item(key).await
        }

        async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.set_item(key, value).await
        }

        async fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
            self.inner.remove_item(key).await
        }
    }

    fn memory_registry() -> ConnectionRegistry {
        let caps = Capabilities::none().with_local_store(Arc::new(MemoryKeyValueStore::new()));
        let store = ConnectionStore::new(BackendPreference::Auto, caps);
        ConnectionRegistry::new(Arc::new(store), Arc::new(SimulatedTester::reliable()))
    }

    async fn file_registry(dir: &tempfile::TempDir) -> (Arc<AppDataDir>, ConnectionRegistry) {
        let bridge = Arc::new(AppDataDir::probe(dir.path()).await.unwrap());
        let caps = Capabilities::none().with_file_bridge(bridge.clone());
        let store = ConnectionStore::new(BackendPreference::Auto, caps);
        let registry =
            ConnectionRegistry::new(Arc::new(store), Arc::new(SimulatedTester::reliable()));
        (bridge, registry)
    }

    fn postgres(name: &str) -> ConnectionFormData {
        ConnectionFormData {
            name: name.to_string(),
            db_type: DatabaseType::PostgreSql,
            host: "db.internal".to_string(),
            port: Some(5432),
            database: "app".to_string(),
            username: "app".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_sqlite_without_port() {
        let registry = memory_registry();
        let form = ConnectionFormData {
            name: "db1".to_string(),
            db_type: DatabaseType::Sqlite,
            database: "/tmp/a.db".to_string(),
            port: Some(0),
            ..Default::default()
        };

        let conn = registry.save(form).await.unwrap();
        assert_eq!(conn.port, 0);
        assert_eq!(conn.status, ConnectionStatus::Connected);
        assert!(conn.last_tested.at().is_some());
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let registry = memory_registry();
        registry.save(postgres("Prod")).await.unwrap();

        let err = registry.save(postgres("prod")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("VALIDATION:"));
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_ignores_unknown_id() {
        let registry = memory_registry();
        let mut form = postgres("With id");
        form.id = Some("client-chosen".to_string());
        let conn = registry.save(form).await.unwrap();
        assert_ne!(conn.id, "client-chosen");
    }

    #[tokio::test]
    async fn test_failed_test_aborts_create() {
        let tester = Arc::new(ScriptedTester::default());
        tester.fail.store(true, Ordering::SeqCst);
        let registry = ConnectionRegistry::new(Arc::new(ConnectionStore::unavailable()), tester.clone());

        let err = registry.save(postgres("Broken")).await.unwrap_err();
        match err {
            RegistryError::TestFailed { code, message } => {
                assert_eq!(code, TestErrorCode::AuthFailed);
                assert_eq!(message, "Authentication failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(registry.get_all().await.is_empty());
        assert_eq!(tester.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_runs_before_tester() {
        let tester = Arc::new(ScriptedTester::default());
        let registry = ConnectionRegistry::new(Arc::new(ConnectionStore::unavailable()), tester.clone());

        let mut form = postgres("No host");
        form.host.clear();
        let err = registry.save(form).await.unwrap_err();
        assert_eq!(err.to_string(), "VALIDATION:Host is required");
        assert_eq!(tester.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_password_when_blank() {
        let registry = memory_registry();
        let conn = registry.save(postgres("Keep")).await.unwrap();

        let mut form = ConnectionFormData::from(&conn);
        form.password.clear();
        form.name = "Kept".to_string();
        let updated = registry.save(form).await.unwrap();

        assert_eq!(updated.id, conn.id);
        assert_eq!(updated.name, "Kept");
        assert_eq!(updated.password, "secret");
        assert_eq!(updated.created_at, conn.created_at);
        assert!(updated.updated_at > conn.updated_at);
    }

    #[tokio::test]
    async fn test_metadata_edit_skips_test() {
        let tester = Arc::new(ScriptedTester::default());
        let store = ConnectionStore::new(
            BackendPreference::Local,
            Capabilities::none().with_local_store(Arc::new(MemoryKeyValueStore::new())),
        );
        let registry = ConnectionRegistry::new(Arc::new(store), tester.clone());
        let conn = registry.save(postgres("Meta")).await.unwrap();
        assert_eq!(tester.calls.load(Ordering::SeqCst), 1);

        // A rename does not need a test, even if the tester would now fail
        tester.fail.store(true, Ordering::SeqCst);
        let renamed = registry
            .update(&conn.id, ConnectionPatch {
                name: Some("Meta renamed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tester.calls.load(Ordering::SeqCst), 1);
        assert_eq!(renamed.status, conn.status);
        assert_eq!(renamed.last_tested, conn.last_tested);

        // A host change does, and the failure leaves the record untouched
        let err = registry
            .update(&conn.id, ConnectionPatch {
                host: Some("elsewhere".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::TestFailed { .. }));
        assert_eq!(registry.get_by_id(&conn.id).await.unwrap().host, "db.internal");
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let registry = memory_registry();
        let err = registry
            .update("missing", ConnectionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_rejected() {
        let registry = memory_registry();
        registry.save(postgres("First")).await.unwrap();
        let second = registry.save(postgres("Second")).await.unwrap();

        let err = registry
            .update(&second.id, ConnectionPatch {
                name: Some("FIRST".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_delete_and_duplicate() {
        let registry = memory_registry();
        let mut form = postgres("Original");
        form.connection_type = ConnectionType::Destination;
        let conn = registry.save(form).await.unwrap();
        assert_eq!(conn.status, ConnectionStatus::Connected);

        let copy = registry.duplicate(&conn.id).await.unwrap().unwrap();
        assert_eq!(copy.name, "Original (Copy)");
        assert_ne!(copy.id, conn.id);
        assert_eq!(copy.status, ConnectionStatus::Disconnected);
        assert_eq!(copy.db_type, conn.db_type);
        assert_eq!(copy.host, conn.host);
        assert_eq!(copy.port, conn.port);
        assert_eq!(copy.database, conn.database);
        assert_eq!(copy.username, conn.username);
        assert_eq!(copy.password, conn.password);
        assert_eq!(copy.connection_type, ConnectionType::Destination);
        assert_eq!(registry.get_all().await.len(), 2);
        assert_eq!(registry.get_by_id(&copy.id).await, Some(copy.clone()));

        assert!(registry.duplicate("missing").await.unwrap().is_none());

        assert!(registry.delete(&conn.id).await.unwrap());
        assert!(!registry.delete(&conn.id).await.unwrap());
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_type() {
        let registry = memory_registry();
        registry.save(postgres("src")).await.unwrap();
        let mut dest = postgres("dest");
        dest.connection_type = ConnectionType::Destination;
        registry.save(dest).await.unwrap();

        let sources = registry.get_by_type(ConnectionType::Source).await;
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "src");

        let stats = registry.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.destination, 1);
        assert_eq!(stats.connected, 2);
    }

    #[tokio::test]
    async fn test_test_does_not_persist() {
        let registry = memory_registry();
        let result = registry.test(&postgres("dry-run")).await;
        assert!(result.success);
        assert!(result.latency_ms.is_some());
        assert!(registry.get_all().await.is_empty());

        let mut invalid = postgres("dry-run");
        invalid.database.clear();
        let result = registry.test(&invalid).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(TestErrorCode::Validation));
        assert_eq!(result.message, "Database name is required");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tester_times_out() {
        let tester = SimulatedTester::reliable()
            .with_latency(Duration::from_secs(30), Duration::from_secs(30));
        let registry = ConnectionRegistry::new(Arc::new(ConnectionStore::unavailable()), Arc::new(tester))
            .with_test_timeout(Duration::from_secs(5));

        let result = registry.test(&postgres("slow")).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(TestErrorCode::Timeout));
    }

    #[tokio::test]
    async fn test_retest_transitions_and_timestamps() {
        let tester = Arc::new(ScriptedTester::default());
        let registry = ConnectionRegistry::new(Arc::new(ConnectionStore::unavailable()), tester.clone());
        let conn = registry.save(postgres("Retest")).await.unwrap();
        let mut events = registry.subscribe();

        tester.fail.store(true, Ordering::SeqCst);
        let result = registry.retest(&conn.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error_code, Some(TestErrorCode::AuthFailed));

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::StatusChanged { id: conn.id.clone(), status: ConnectionStatus::Testing }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::StatusChanged { id: conn.id.clone(), status: ConnectionStatus::Disconnected }
        );

        let first = registry.get_by_id(&conn.id).await.unwrap();
        assert_eq!(first.status, ConnectionStatus::Disconnected);
        assert!(first.last_tested.at() > conn.last_tested.at());

        tester.fail.store(false, Ordering::SeqCst);
        assert!(registry.retest(&conn.id).await.unwrap().success);
        let second = registry.get_by_id(&conn.id).await.unwrap();
        assert_eq!(second.status, ConnectionStatus::Connected);
        assert!(second.last_tested.at() > first.last_tested.at());
    }

    #[tokio::test]
    async fn test_retest_unknown_id() {
        let registry = memory_registry();
        let result = registry.retest("nope").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Connection not found");
    }

    #[tokio::test]
    async fn test_retest_persists_testing_state() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(AppDataDir::probe(dir.path()).await.unwrap());

        /// Tester that reads the data file while the test is running
        struct PeekingTester {
            bridge: Arc<AppDataDir>,
            seen: Mutex<Option<String>>,
        }

        #[async_trait]
        impl ConnectionTester for PeekingTester {
            async fn check(&self, _form: &ConnectionFormData) -> Result<(), TestFailure> {
                if let Ok(content) = self.bridge.read_file(CONNECTIONS_FILE).await {
                    *self.seen.lock().await = Some(content);
                }
                Ok(())
            }
        }

        let tester = Arc::new(PeekingTester {
            bridge: bridge.clone(),
            seen: Mutex::new(None),
        });
        let store = ConnectionStore::new(
            BackendPreference::File,
            Capabilities::none().with_file_bridge(bridge.clone()),
        );
        let registry = ConnectionRegistry::new(Arc::new(store), tester.clone());
        let conn = registry.save(postgres("Peek")).await.unwrap();

        registry.retest(&conn.id).await.unwrap();
        let seen = tester.seen.lock().await.clone().unwrap();
        assert!(seen.contains("\"status\": \"testing\""));

        let final_doc = bridge.read_file(CONNECTIONS_FILE).await.unwrap();
        assert!(final_doc.contains("\"status\": \"connected\""));
    }

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_bridge, registry) = file_registry(&dir).await;
        registry.save(postgres("One")).await.unwrap();
        registry.save(postgres("Two")).await.unwrap();
        let sqlite = registry
            .save(ConnectionFormData {
                name: " db1 ".to_string(),
                db_type: DatabaseType::Sqlite,
                database: "/tmp/a.db".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sqlite.name, "db1");
        assert_eq!(sqlite.host, "localhost");
        let saved = registry.get_all().await;

        let (_bridge, reopened) = file_registry(&dir).await;
        let loaded = reopened.get_all().await;
        assert_eq!(loaded, saved);
        assert_eq!(loaded[2], sqlite);
    }

    #[tokio::test]
    async fn test_trimmed_name_still_unique() {
        let registry = memory_registry();
        registry.save(postgres("Prod")).await.unwrap();
        let err = registry.save(postgres("  prod ")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_unsupported_stored_type_survives_save() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = AppDataDir::probe(dir.path()).await.unwrap();
        bridge
            .write_file(
                CONNECTIONS_FILE,
                r#"{"connections":[{"id":"legacy","name":"Legacy","type":"Oracle","host":"ora.internal","database":"erp"}],"lastUpdated":"2024-01-01T00:00:00.000Z","version":"1.0.0"}"#,
            )
            .await
            .unwrap();

        let (bridge, registry) = file_registry(&dir).await;
        let loaded = registry.get_all().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].db_type, DatabaseType::MySql);
        assert_eq!(loaded[0].port, 3306);

        registry
            .save(ConnectionFormData {
                name: "db1".to_string(),
                db_type: DatabaseType::Sqlite,
                database: "/tmp/a.db".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let on_disk = bridge.read_file(CONNECTIONS_FILE).await.unwrap();
        let stored = serializer::decode_stored(&on_disk).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|c| c.id == "legacy" && c.host == "ora.internal"));
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let kv = Arc::new(FlakyStore::default());
        let store = ConnectionStore::new(
            BackendPreference::Local,
            Capabilities::none().with_local_store(kv.clone()),
        );
        let registry =
            ConnectionRegistry::new(Arc::new(store), Arc::new(SimulatedTester::reliable()));
        let conn = registry.save(postgres("Stable")).await.unwrap();

        kv.broken.store(true, Ordering::SeqCst);
        let err = registry.save(postgres("Lost")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));
        assert!(registry.delete(&conn.id).await.is_err());

        let all = registry.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Stable");
    }

    #[tokio::test]
    async fn test_concurrent_creates_with_same_name() {
        let registry = Arc::new(memory_registry());
        let a = tokio::spawn({
            let registry = registry.clone();
            async move { registry.save(postgres("Twin")).await }
        });
        let b = tokio::spawn({
            let registry = registry.clone();
            async move { registry.save(postgres("twin")).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_import_applies_defaults_and_skips_clashes() {
        let registry = memory_registry();
        registry.save(postgres("Existing")).await.unwrap();

        let content = r#"{
            "connections": [
                {"name": "Imported", "type": "PostgreSQL", "host": "pg", "database": "x"},
                {"name": "existing", "type": "MySQL"}
            ],
            "version": "1.0.0"
        }"#;
        let report = registry.import_connections(content).await.unwrap();

        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        let imported = &report.imported[0];
        assert_eq!(imported.port, 5432);
        assert_eq!(imported.status, ConnectionStatus::Disconnected);
        assert_eq!(registry.get_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_document() {
        let registry = memory_registry();
        let err = registry.import_connections(r#"{"items": []}"#).await.unwrap_err();
        assert!(matches!(err, RegistryError::Import(_)));
    }

    #[tokio::test]
    async fn test_export_strips_passwords() {
        let registry = memory_registry();
        registry.save(postgres("Secret")).await.unwrap();

        let exported = registry.export_connections().await.unwrap();
        assert!(!exported.contains("secret\""));
        let doc: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(doc["connections"][0]["password"], "");

        // Memory still has the password
        assert_eq!(registry.get_all().await[0].password, "secret");
    }

    #[tokio::test]
    async fn test_clear_all_backs_up_first() {
        let dir = tempfile::tempdir().unwrap();
        let (_bridge, registry) = file_registry(&dir).await;
        registry.save(postgres("Gone")).await.unwrap();

        assert_eq!(registry.clear_all().await.unwrap(), 1);
        assert!(registry.get_all().await.is_empty());

        let backups = registry.list_backups().await;
        assert_eq!(backups.len(), 1);
        assert!(registry.restore_backup(&backups[0]).await);
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (_bridge, registry) = file_registry(&dir).await;
        registry.save(postgres("Mine")).await.unwrap();

        let (_bridge, other) = file_registry(&dir).await;
        other.save(postgres("Theirs")).await.unwrap();

        assert_eq!(registry.get_all().await.len(), 1);
        assert_eq!(registry.refresh().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_load() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (_bridge, seed) = file_registry(&dir).await;
            seed.save(postgres("Seed")).await.unwrap();
        }
        let (_bridge, registry) = file_registry(&dir).await;
        let registry = Arc::new(registry);

        let counts = futures::future::join_all((0..8).map(|_| {
            let registry = registry.clone();
            async move { registry.get_all().await.len() }
        }))
        .await;
        assert_eq!(counts, vec![1; 8]);
    }
}
