use super::correlation::PendingTask;
use super::descriptor::{TaskPurpose, TaskResponse};
use crate::lifecycle::LifecycleManager;
use crate::source::{BuildDetails, IdentityKeyStrategy};
use crate::store::{Artifact, ArtifactStore, CollectionStore, StreamStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to a dispatched task once its correlation was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// New artifacts created from a collection response.
    Collected(usize),
    /// Stored artifacts removed after a cleanup response.
    CleanedUp(usize),
    /// The worker reported an error.
    Failed,
    /// No response arrived in time, or the correlation was already settled.
    Expired,
    /// The stream was deleted while the task was in flight.
    StreamGone,
}

impl CompletionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CompletionOutcome::Collected(_) => "collected",
            CompletionOutcome::CleanedUp(_) => "cleaned_up",
            CompletionOutcome::Failed => "failed",
            CompletionOutcome::Expired => "expired",
            CompletionOutcome::StreamGone => "stream_gone",
        }
    }
}

/// Applies worker responses. Never returns an error: failures are recorded on
/// the stream and logged.
pub struct CompletionHandler {
    store: Arc<dyn CollectionStore>,
    lifecycle: Arc<LifecycleManager>,
}

impl CompletionHandler {
    pub fn new(store: Arc<dyn CollectionStore>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self { store, lifecycle }
    }

    pub async fn handle(&self, task: &PendingTask, response: TaskResponse) -> CompletionOutcome {
        match (task.purpose, response) {
            (TaskPurpose::Collection, TaskResponse::Success { builds }) => {
                self.on_collected(task, builds).await
            }
            (TaskPurpose::Collection, TaskResponse::Failure { error }) => {
                warn!(
                    "Collection task {} for stream {} failed: {}",
                    task.correlation_id, task.stream_id, error
                );
                self.record_failure(&task.stream_id);
                CompletionOutcome::Failed
            }
            (TaskPurpose::Cleanup, TaskResponse::Success { builds }) => {
                self.on_cleanup(task, builds).await
            }
            (TaskPurpose::Cleanup, TaskResponse::Failure { error }) => {
                warn!(
                    "Cleanup task {} for stream {} failed: {}",
                    task.correlation_id, task.stream_id, error
                );
                CompletionOutcome::Failed
            }
        }
    }

    /// Settle a correlation that will not receive a response.
    pub fn expire(&self, task: &PendingTask, reason: &str) -> CompletionOutcome {
        warn!(
            "{} task {} for stream {} expired: {}",
            task.purpose.as_str(),
            task.correlation_id,
            task.stream_id,
            reason
        );
        if task.purpose == TaskPurpose::Collection {
            self.record_failure(&task.stream_id);
        }
        CompletionOutcome::Expired
    }

    fn record_failure(&self, stream_id: &str) {
        if let Err(e) = self.store.increment_failed_attempts(stream_id) {
            warn!("Failed to record failure for stream {}: {}", stream_id, e);
        }
    }

    async fn on_collected(&self, task: &PendingTask, builds: Vec<BuildDetails>) -> CompletionOutcome {
        let stream = match self.store.get_stream(&task.stream_id) {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                debug!(
                    "Stream {} deleted before task {} completed",
                    task.stream_id, task.correlation_id
                );
                return CompletionOutcome::StreamGone;
            }
            Err(e) => {
                error!("Failed to load stream {}: {}", task.stream_id, e);
                return CompletionOutcome::Failed;
            }
        };

        match self
            .lifecycle
            .create_artifacts(&stream, &task.attributes, builds)
            .await
        {
            Ok(created) => {
                let now = chrono::Utc::now().timestamp_millis();
                if let Err(e) = self.store.record_successful_iteration(&stream.id, now) {
                    warn!("Failed to record iteration of stream {}: {}", stream.id, e);
                }
                CompletionOutcome::Collected(created.len())
            }
            Err(e) => {
                error!(
                    "Failed to create artifacts for stream {} from task {}: {:#}",
                    stream.id, task.correlation_id, e
                );
                self.record_failure(&stream.id);
                CompletionOutcome::Failed
            }
        }
    }

    /// Delete stored artifacts whose build is no longer listed by the source.
    async fn on_cleanup(&self, task: &PendingTask, builds: Vec<BuildDetails>) -> CompletionOutcome {
        if builds.is_empty() {
            info!(
                "Cleanup of stream {} returned no builds, keeping stored artifacts",
                task.stream_id
            );
            return CompletionOutcome::CleanedUp(0);
        }
        let stream = match self.store.get_stream(&task.stream_id) {
            Ok(Some(stream)) => stream,
            Ok(None) => return CompletionOutcome::StreamGone,
            Err(e) => {
                error!("Failed to load stream {}: {}", task.stream_id, e);
                return CompletionOutcome::Failed;
            }
        };

        let strategy = IdentityKeyStrategy::for_source(stream.source_type, &task.attributes);
        let listed: HashSet<&str> = builds.iter().filter_map(|b| strategy.build_key(b)).collect();
        let stored = match self.store.list_artifacts(&stream.id) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to list artifacts of stream {}: {}", stream.id, e);
                return CompletionOutcome::Failed;
            }
        };
        let vanished: Vec<Artifact> = stored
            .into_iter()
            .filter(|artifact| {
                strategy
                    .stored_key(&artifact.key_fields())
                    .is_some_and(|key| !listed.contains(key))
            })
            .collect();

        match self.lifecycle.delete_artifacts(&vanished).await {
            Ok(report) => {
                if report.artifacts_deleted > 0 {
                    info!(
                        "Cleanup removed {} artifacts no longer present in stream {}",
                        report.artifacts_deleted, stream.id
                    );
                }
                CompletionOutcome::CleanedUp(report.artifacts_deleted)
            }
            Err(e) => {
                warn!(
                    "Cleanup of stream {} failed for {} artifacts: {:#}",
                    stream.id,
                    vanished.len(),
                    e
                );
                CompletionOutcome::Failed
            }
        }
    }
}
