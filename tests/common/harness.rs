//! Wires the collection services over a temporary database

use super::constants::*;
use super::fakes::*;
use artifact_collector::collaborators::{
    BoundService, Collaborators, LocalLockManager, SourceConnection,
};
use artifact_collector::lifecycle::{ContentCollectionQueue, ContentCollectionSignal};
use artifact_collector::polling::FeatureFlagEligibility;
use artifact_collector::source::{ArtifactStream, SourceType};
use artifact_collector::store::StreamStore;
use artifact_collector::{
    CollectionCoordinator, CollectorConfig, LifecycleManager, PollingModeMigrator,
    SqliteCollectionStore,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub struct TestCollector {
    pub store: Arc<SqliteCollectionStore>,
    pub connections: Arc<FakeConnections>,
    pub secrets: Arc<FakeSecrets>,
    pub services: Arc<FakeServices>,
    pub worker: Arc<FakeWorker>,
    pub files: Arc<FakeFileStore>,
    pub perpetual_tasks: Arc<FakePerpetualTasks>,
    pub flags: Arc<FakeFlags>,
    pub connector: Arc<FakeConnector>,
    pub lifecycle: Arc<LifecycleManager>,
    pub coordinator: Arc<CollectionCoordinator>,
    pub migrator: PollingModeMigrator,
    pub signals: mpsc::UnboundedReceiver<ContentCollectionSignal>,
    _temp_dir: TempDir,
}

impl TestCollector {
    pub fn new() -> Self {
        Self::with_config(CollectorConfig::default())
    }

    pub fn with_config(config: CollectorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteCollectionStore::new(temp_dir.path().join("collector.db"))
                .expect("Failed to open collection store"),
        );

        let connections = Arc::new(FakeConnections::default());
        connections.put(SourceConnection::new(CONNECTION_ID, ACCOUNT_ID));
        let services = Arc::new(FakeServices::default());
        services.put(BoundService {
            id: SERVICE_ID.to_string(),
            artifact_type: None,
        });
        let secrets = Arc::new(FakeSecrets::default());
        let worker = Arc::new(FakeWorker::default());
        let files = Arc::new(FakeFileStore::default());
        let perpetual_tasks = Arc::new(FakePerpetualTasks::default());
        let flags = Arc::new(FakeFlags::default());
        let connector = Arc::new(FakeConnector::default());

        let collaborators = Collaborators {
            connections: connections.clone(),
            secrets: secrets.clone(),
            services: services.clone(),
            worker: worker.clone(),
            files: files.clone(),
            perpetual_tasks: perpetual_tasks.clone(),
            flags: flags.clone(),
            lock: Arc::new(LocalLockManager::new()),
        };

        let (queue, signals) = ContentCollectionQueue::channel();
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            files.clone(),
            queue,
            config.collection.retention_size,
        ));
        let coordinator = Arc::new(CollectionCoordinator::new(
            store.clone(),
            collaborators,
            connector.clone(),
            lifecycle.clone(),
            config.clone(),
        ));
        let migrator = PollingModeMigrator::new(
            store.clone(),
            perpetual_tasks.clone(),
            Arc::new(FeatureFlagEligibility::new(flags.clone())),
            config.migration.batch_size,
        );

        Self {
            store,
            connections,
            secrets,
            services,
            worker,
            files,
            perpetual_tasks,
            flags,
            connector,
            lifecycle,
            coordinator,
            migrator,
            signals,
            _temp_dir: temp_dir,
        }
    }

    /// Connection-backed stream bound to the default service, not yet stored.
    pub fn new_stream(&self, id: &str, source_type: SourceType) -> ArtifactStream {
        let mut stream = ArtifactStream::new(id, ACCOUNT_ID, source_type, format!("{}-source", id));
        stream.app_id = APP_ID.to_string();
        stream.service_id = Some(SERVICE_ID.to_string());
        stream.connection_id = Some(CONNECTION_ID.to_string());
        stream
    }

    pub fn add_stream(&self, id: &str, source_type: SourceType) -> ArtifactStream {
        self.save(self.new_stream(id, source_type))
    }

    pub fn save(&self, stream: ArtifactStream) -> ArtifactStream {
        self.store
            .create_stream(&stream)
            .expect("Failed to create stream");
        stream
    }

    pub fn stream(&self, id: &str) -> ArtifactStream {
        self.store
            .get_stream(id)
            .expect("Failed to load stream")
            .expect("Stream not found")
    }

    /// Content-collection signals emitted so far.
    pub fn drain_signals(&mut self) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            ids.push(signal.artifact_id);
        }
        ids
    }
}
