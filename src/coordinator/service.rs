use super::skip::{SkipPolicy, SkipReason};
use crate::collaborators::{Collaborators, PerpetualTaskParams};
use crate::collector::{Collector, SourceConnector};
use crate::config::CollectorConfig;
use crate::dispatch::{DispatchTicket, RemoteTaskDispatcher, TaskPurpose};
use crate::error::{CollectionError, CollectionResult};
use crate::lifecycle::{GcReport, LifecycleManager};
use crate::metrics;
use crate::source::ArtifactStream;
use crate::store::{Artifact, CollectionStore, StreamStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Entry point for schedulers and stream management: skip policy, locking and
/// failure accounting around the synchronous and delegated collection paths.
pub struct CollectionCoordinator {
    store: Arc<dyn CollectionStore>,
    collaborators: Collaborators,
    lifecycle: Arc<LifecycleManager>,
    collector: Collector,
    dispatcher: RemoteTaskDispatcher,
    config: CollectorConfig,
}

fn lock_scope(stream_id: &str) -> String {
    format!("artifact-collection:{}", stream_id)
}

impl CollectionCoordinator {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        collaborators: Collaborators,
        connector: Arc<dyn SourceConnector>,
        lifecycle: Arc<LifecycleManager>,
        config: CollectorConfig,
    ) -> Self {
        let collector = Collector::new(
            store.clone(),
            collaborators.clone(),
            connector,
            lifecycle.clone(),
            config.clone(),
        );
        let dispatcher = RemoteTaskDispatcher::new(
            store.clone(),
            collaborators.clone(),
            lifecycle.clone(),
            config.clone(),
        );
        Self {
            store,
            collaborators,
            lifecycle,
            collector,
            dispatcher,
            config,
        }
    }

    pub fn dispatcher(&self) -> &RemoteTaskDispatcher {
        &self.dispatcher
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    fn skip_policy(&self) -> SkipPolicy<'_> {
        SkipPolicy {
            store: self.store.as_ref(),
            collaborators: &self.collaborators,
            max_failed_attempts: self.config.collection.max_failed_attempts,
        }
    }

    /// Skip check shared by every cron-triggered path. A missing connection
    /// counts as a failed attempt and skips.
    async fn should_skip(
        &self,
        stream: &mut ArtifactStream,
        purpose: TaskPurpose,
    ) -> CollectionResult<bool> {
        match self.skip_policy().check(stream, purpose).await {
            Ok(None) => Ok(false),
            Ok(Some(reason)) => {
                self.log_skip(stream, purpose, &reason);
                Ok(true)
            }
            Err(CollectionError::InvalidConnection { connection_id }) => {
                warn!(
                    "Connection {} of stream {} is missing, skipping {}",
                    connection_id,
                    stream.id,
                    purpose.as_str()
                );
                self.store.increment_failed_attempts(&stream.id)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn log_skip(&self, stream: &ArtifactStream, purpose: TaskPurpose, reason: &SkipReason) {
        match reason {
            SkipReason::PerpetualTaskBound => debug!(
                "Skipping {} of stream {}: {}",
                purpose.as_str(),
                stream.id,
                reason
            ),
            _ => info!(
                "Skipping {} of stream {}: {}",
                purpose.as_str(),
                stream.id,
                reason
            ),
        }
    }

    /// Cron-triggered synchronous collection.
    ///
    /// At most one run per stream holds the collection lock; a run that cannot
    /// acquire it within the lock timeout is abandoned. Connector failures, a
    /// vanished connection and an invalid custom script are recorded on the
    /// stream and yield an empty result.
    pub async fn collect_new_artifacts(&self, stream_id: &str) -> CollectionResult<Vec<Artifact>> {
        let Some(mut stream) = self.store.get_stream(stream_id)? else {
            debug!("Artifact stream {} no longer exists", stream_id);
            return Ok(Vec::new());
        };
        if self.should_skip(&mut stream, TaskPurpose::Collection).await? {
            metrics::record_collection_run("skipped");
            return Ok(Vec::new());
        }

        let scope = lock_scope(stream_id);
        let _guard = match self
            .collaborators
            .lock
            .acquire(&scope, self.config.collection.lock_timeout())
            .await
        {
            Ok(guard) => guard,
            Err(e) => {
                warn!(
                    "Collection of stream {} already in progress, abandoning: {:#}",
                    stream_id, e
                );
                metrics::record_collection_run("abandoned");
                return Ok(Vec::new());
            }
        };

        match self.collector.collect_new(stream_id).await {
            Ok(created) => {
                let now = chrono::Utc::now().timestamp_millis();
                self.store.record_successful_iteration(stream_id, now)?;
                metrics::record_collection_run("collected");
                Ok(created)
            }
            Err(
                e @ (CollectionError::Connector(_)
                | CollectionError::InvalidConnection { .. }
                | CollectionError::InvalidScript(_)),
            ) => {
                warn!("Collection of stream {} failed: {}", stream_id, e);
                self.store.increment_failed_attempts(stream_id)?;
                metrics::record_collection_run("failed");
                Ok(Vec::new())
            }
            Err(e @ CollectionError::StreamOrphaned { .. }) => {
                self.delete_orphan_task(&stream).await;
                metrics::record_collection_run("failed");
                Err(e)
            }
            Err(e) => {
                error!("Collection of stream {} failed: {}", stream_id, e);
                metrics::record_collection_run("failed");
                Err(e)
            }
        }
    }

    /// Delegated collection; returns once the task is submitted.
    pub async fn collect_new_artifacts_async(
        &self,
        stream_id: &str,
        correlation_hint: &str,
    ) -> CollectionResult<Option<DispatchTicket>> {
        let Some(mut stream) = self.store.get_stream(stream_id)? else {
            debug!("Artifact stream {} no longer exists", stream_id);
            return Ok(None);
        };
        if self.should_skip(&mut stream, TaskPurpose::Collection).await? {
            metrics::record_collection_run("skipped");
            return Ok(None);
        }
        self.dispatch(&stream, TaskPurpose::Collection, correlation_hint)
            .await
    }

    /// Delegated cleanup: the worker lists every current build and stored
    /// artifacts missing from that list are deleted. Independent of polling mode.
    pub async fn cleanup_artifacts_async(
        &self,
        stream: &ArtifactStream,
    ) -> CollectionResult<Option<DispatchTicket>> {
        if !stream.profile().supports_cleanup {
            info!(
                "Cleanup is not supported for {} stream {}",
                stream.source_type.as_str(),
                stream.id
            );
            return Ok(None);
        }
        let mut stream = stream.clone();
        if self.should_skip(&mut stream, TaskPurpose::Cleanup).await? {
            return Ok(None);
        }
        self.dispatch(&stream, TaskPurpose::Cleanup, "cleanup").await
    }

    async fn dispatch(
        &self,
        stream: &ArtifactStream,
        purpose: TaskPurpose,
        correlation_hint: &str,
    ) -> CollectionResult<Option<DispatchTicket>> {
        match self
            .dispatcher
            .dispatch(stream, purpose, correlation_hint)
            .await
        {
            Err(e @ CollectionError::StreamOrphaned { .. }) => {
                self.delete_orphan_task(stream).await;
                Err(e)
            }
            other => other,
        }
    }

    /// Best-effort removal of the perpetual task of a stream that was purged
    /// as orphaned.
    async fn delete_orphan_task(&self, stream: &ArtifactStream) {
        let Some(task_id) = stream.perpetual_task_id.as_deref().filter(|id| !id.is_empty()) else {
            return;
        };
        let deleted = self
            .collaborators
            .perpetual_tasks
            .delete(&stream.account_id, task_id)
            .await;
        metrics::record_perpetual_task_op("delete", deleted.is_ok());
        if let Err(e) = deleted {
            warn!(
                "Failed to delete perpetual task {} of orphaned stream {}: {:#}",
                task_id, stream.id, e
            );
        }
    }

    /// Put a STOPPED stream back into rotation with a zeroed failure counter.
    pub fn reset_stopped_collection(&self, stream_id: &str) -> CollectionResult<bool> {
        let reset = self.store.reset_stopped_collection(stream_id)?;
        if reset {
            info!("Collection of stream {} restarted", stream_id);
        }
        Ok(reset)
    }

    /// The stream's identifying attributes changed: forget everything collected
    /// so far and restart push-based polling.
    pub async fn on_source_changed(&self, stream: &ArtifactStream) -> CollectionResult<GcReport> {
        let report = self.lifecycle.delete_all_artifacts(&stream.id).await?;
        info!(
            "Source of stream {} changed, deleted {} artifacts",
            stream.id, report.artifacts_deleted
        );

        if let Some(task_id) = stream.perpetual_task_id.as_deref().filter(|id| !id.is_empty()) {
            let params = PerpetualTaskParams {
                stream_id: stream.id.clone(),
            };
            let reset = self
                .collaborators
                .perpetual_tasks
                .reset(&stream.account_id, task_id, &params)
                .await;
            metrics::record_perpetual_task_op("reset", reset.is_ok());
            if let Err(e) = reset {
                warn!(
                    "Failed to reset perpetual task {} of stream {}: {:#}",
                    task_id, stream.id, e
                );
            }
        }
        Ok(report)
    }
}
