use crate::dispatch::{TaskDescriptor, TaskResponse};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::oneshot;

/// Receives the worker's response for exactly one correlation id.
pub type CompletionSender = oneshot::Sender<TaskResponse>;

/// Remote execution fabric that performs repository calls.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait WorkerDispatch: Send + Sync {
    /// Register where the response for `correlation_id` must be delivered.
    fn on_complete(&self, correlation_id: &str, handler: CompletionSender) -> Result<()>;

    /// Queue a task, returning the fabric's task id.
    async fn submit(&self, task: TaskDescriptor) -> Result<String>;
}

/// Binary content storage.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn delete(&self, file_id: &str) -> Result<()>;

    async fn download(&self, file_id: &str, dest: &Path) -> Result<()>;
}
