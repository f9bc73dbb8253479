//! In-memory collaborators recording the calls made against them

use anyhow::{anyhow, bail, ensure, Result};
use artifact_collector::collaborators::{
    BoundService, CompletionSender, ConnectionStore, EncryptedDetails, FeatureFlag, FeatureFlags,
    FileStore, PerpetualTaskClient, PerpetualTaskParams, SecretManager, ServiceBindings,
    SourceConnection, WorkerDispatch,
};
use artifact_collector::dispatch::{TaskDescriptor, TaskResponse};
use artifact_collector::source::{BuildDetails, BuildSourceParameters};
use artifact_collector::SourceConnector;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FakeConnections {
    connections: Mutex<HashMap<String, SourceConnection>>,
}

impl FakeConnections {
    pub fn put(&self, connection: SourceConnection) {
        self.connections
            .lock()
            .unwrap()
            .insert(connection.id.clone(), connection);
    }

    pub fn remove(&self, connection_id: &str) {
        self.connections.lock().unwrap().remove(connection_id);
    }
}

impl ConnectionStore for FakeConnections {
    fn get(&self, connection_id: &str) -> Result<Option<SourceConnection>> {
        Ok(self.connections.lock().unwrap().get(connection_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeSecrets {
    secrets: Mutex<HashMap<String, String>>,
}

impl FakeSecrets {
    pub fn put(&self, name: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }
}

impl SecretManager for FakeSecrets {
    fn decrypt(&self, connection: &SourceConnection) -> Result<EncryptedDetails> {
        Ok(EncryptedDetails {
            secret_refs: vec![format!("secret:{}", connection.id)],
        })
    }

    fn resolve_secret(&self, _account_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }
}

#[derive(Default)]
pub struct FakeServices {
    services: Mutex<HashMap<String, BoundService>>,
}

impl FakeServices {
    pub fn put(&self, service: BoundService) {
        self.services
            .lock()
            .unwrap()
            .insert(service.id.clone(), service);
    }

    pub fn remove(&self, service_id: &str) {
        self.services.lock().unwrap().remove(service_id);
    }
}

impl ServiceBindings for FakeServices {
    fn get_service(&self, service_id: &str) -> Result<Option<BoundService>> {
        Ok(self.services.lock().unwrap().get(service_id).cloned())
    }
}

/// Holds completion routes until the test answers them.
#[derive(Default)]
pub struct FakeWorker {
    routes: Mutex<HashMap<String, CompletionSender>>,
    submitted: Mutex<Vec<TaskDescriptor>>,
    pub reject: AtomicBool,
}

impl FakeWorker {
    pub fn respond(&self, correlation_id: &str, response: TaskResponse) -> Result<()> {
        let sender = self
            .routes
            .lock()
            .unwrap()
            .remove(correlation_id)
            .ok_or_else(|| anyhow!("No route for {}", correlation_id))?;
        sender
            .send(response)
            .map_err(|_| anyhow!("Correlation {} is no longer awaited", correlation_id))
    }

    pub fn submitted(&self) -> Vec<TaskDescriptor> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerDispatch for FakeWorker {
    fn on_complete(&self, correlation_id: &str, handler: CompletionSender) -> Result<()> {
        self.routes
            .lock()
            .unwrap()
            .insert(correlation_id.to_string(), handler);
        Ok(())
    }

    async fn submit(&self, task: TaskDescriptor) -> Result<String> {
        if self.reject.load(Ordering::SeqCst) {
            bail!("No eligible workers");
        }
        ensure!(
            self.routes.lock().unwrap().contains_key(&task.correlation_id),
            "Completion route for {} registered after submission",
            task.correlation_id
        );
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(task);
        Ok(format!("task-{}", submitted.len()))
    }
}

#[derive(Default)]
pub struct FakeFileStore {
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeFileStore {
    pub fn fail_on(&self, file_id: &str) {
        self.failing.lock().unwrap().insert(file_id.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStore for FakeFileStore {
    async fn delete(&self, file_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(file_id.to_string());
        if self.failing.lock().unwrap().contains(file_id) {
            bail!("Storage refused to delete {}", file_id);
        }
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()> {
        std::fs::write(dest, file_id)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePerpetualTasks {
    next_id: AtomicUsize,
    pub fail_create: AtomicBool,
    failing_resets: Mutex<HashSet<String>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    resets: Mutex<Vec<String>>,
}

impl FakePerpetualTasks {
    pub fn fail_reset_of(&self, task_id: &str) {
        self.failing_resets
            .lock()
            .unwrap()
            .insert(task_id.to_string());
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().unwrap().clone()
    }
}

#[async_trait]
impl PerpetualTaskClient for FakePerpetualTasks {
    async fn create(&self, _account_id: &str, params: &PerpetualTaskParams) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("Perpetual task service unavailable");
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = format!("pt-{}-{}", params.stream_id, n);
        self.created.lock().unwrap().push(task_id.clone());
        Ok(task_id)
    }

    async fn reset(
        &self,
        _account_id: &str,
        task_id: &str,
        _params: &PerpetualTaskParams,
    ) -> Result<bool> {
        self.resets.lock().unwrap().push(task_id.to_string());
        if self.failing_resets.lock().unwrap().contains(task_id) {
            bail!("Reset of {} failed", task_id);
        }
        Ok(true)
    }

    async fn delete(&self, _account_id: &str, task_id: &str) -> Result<bool> {
        self.deleted.lock().unwrap().push(task_id.to_string());
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeFlags {
    enabled: Mutex<HashMap<FeatureFlag, BTreeSet<String>>>,
    global: Mutex<HashSet<FeatureFlag>>,
}

impl FakeFlags {
    pub fn enable(&self, flag: FeatureFlag, account_id: &str) {
        self.enabled
            .lock()
            .unwrap()
            .entry(flag)
            .or_default()
            .insert(account_id.to_string());
    }

    pub fn enable_globally(&self, flag: FeatureFlag) {
        self.global.lock().unwrap().insert(flag);
    }
}

impl FeatureFlags for FakeFlags {
    fn is_enabled(&self, flag: FeatureFlag, account_id: &str) -> bool {
        self.is_globally_enabled(flag)
            || self
                .enabled
                .lock()
                .unwrap()
                .get(&flag)
                .is_some_and(|accounts| accounts.contains(account_id))
    }

    fn is_globally_enabled(&self, flag: FeatureFlag) -> bool {
        self.global.lock().unwrap().contains(&flag)
    }

    fn accounts_with(&self, flag: FeatureFlag) -> BTreeSet<String> {
        self.enabled
            .lock()
            .unwrap()
            .get(&flag)
            .cloned()
            .unwrap_or_default()
    }
}

/// Serves a fixed build list per stream.
#[derive(Default)]
pub struct FakeConnector {
    builds: Mutex<HashMap<String, Vec<BuildDetails>>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
}

impl FakeConnector {
    pub fn set_builds(&self, stream_id: &str, builds: Vec<BuildDetails>) {
        self.builds
            .lock()
            .unwrap()
            .insert(stream_id.to_string(), builds);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnector for FakeConnector {
    async fn fetch_builds(
        &self,
        params: &BuildSourceParameters,
    ) -> Result<Option<Vec<BuildDetails>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("Repository at {} timed out", params.stream_id);
        }
        let builds = self
            .builds
            .lock()
            .unwrap()
            .get(&params.stream_id)
            .cloned()
            .unwrap_or_default();
        Ok(Some(builds))
    }
}
