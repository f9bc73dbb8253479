//! Interfaces of the systems this crate orchestrates but does not own:
//! credential storage, secret decryption, the remote worker fabric, binary
//! storage, perpetual-task management, feature flags and locking.

mod connections;
mod lock;
mod perpetual;
mod worker;

pub use connections::{
    BoundService, ConnectionStore, ConnectivityState, EncryptedDetails, SecretManager,
    ServiceBindings, SourceConnection,
};
pub use lock::{DistributedLock, LocalLockManager, LockGuard};
pub use perpetual::{FeatureFlag, FeatureFlags, PerpetualTaskClient, PerpetualTaskParams};
pub use worker::{CompletionSender, FileStore, WorkerDispatch};

#[cfg(any(test, feature = "mock"))]
pub use connections::{MockConnectionStore, MockSecretManager, MockServiceBindings};
#[cfg(any(test, feature = "mock"))]
pub use lock::MockDistributedLock;
#[cfg(any(test, feature = "mock"))]
pub use perpetual::{MockFeatureFlags, MockPerpetualTaskClient};
#[cfg(any(test, feature = "mock"))]
pub use worker::{MockFileStore, MockWorkerDispatch};

use std::sync::Arc;

/// Handles to every external system, shared by the collection services.
#[derive(Clone)]
pub struct Collaborators {
    pub connections: Arc<dyn ConnectionStore>,
    pub secrets: Arc<dyn SecretManager>,
    pub services: Arc<dyn ServiceBindings>,
    pub worker: Arc<dyn WorkerDispatch>,
    pub files: Arc<dyn FileStore>,
    pub perpetual_tasks: Arc<dyn PerpetualTaskClient>,
    pub flags: Arc<dyn FeatureFlags>,
    pub lock: Arc<dyn DistributedLock>,
}

#[cfg(test)]
impl Collaborators {
    /// Mocks without expectations; tests swap in the ones they exercise.
    pub(crate) fn unexpected() -> Self {
        Self {
            connections: Arc::new(MockConnectionStore::new()),
            secrets: Arc::new(MockSecretManager::new()),
            services: Arc::new(MockServiceBindings::new()),
            worker: Arc::new(MockWorkerDispatch::new()),
            files: Arc::new(MockFileStore::new()),
            perpetual_tasks: Arc::new(MockPerpetualTaskClient::new()),
            flags: Arc::new(MockFeatureFlags::new()),
            lock: Arc::new(LocalLockManager::new()),
        }
    }

    /// Every connection exists under account "acc" and decrypts to an empty handle.
    pub(crate) fn with_connections(mut self) -> Self {
        let mut connections = MockConnectionStore::new();
        connections
            .expect_get()
            .returning(|id| Ok(Some(SourceConnection::new(id, "acc"))));
        connections
            .expect_connectivity()
            .returning(|_| Ok(ConnectivityState::Healthy));
        let mut secrets = MockSecretManager::new();
        secrets
            .expect_decrypt()
            .returning(|_| Ok(EncryptedDetails::default()));
        self.connections = Arc::new(connections);
        self.secrets = Arc::new(secrets);
        self
    }
}
