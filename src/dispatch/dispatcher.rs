use super::correlation::{CorrelationRegistry, PendingTask, Registration};
use super::descriptor::{TaskDescriptor, TaskPurpose};
use super::response::{CompletionHandler, CompletionOutcome};
use crate::collaborators::{Collaborators, FeatureFlag};
use crate::collector::{bound_attributes, saved_keys, ParameterResolver};
use crate::config::CollectorConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::lifecycle::LifecycleManager;
use crate::metrics;
use crate::source::{ArtifactStream, IdentityKeyStrategy, RequestKind};
use crate::store::{CollectionStore, StreamStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle on a submitted task.
#[derive(Debug)]
pub struct DispatchTicket {
    pub correlation_id: String,
    /// Id assigned by the worker fabric.
    pub task_id: String,
    /// Resolves once the response has been applied or the correlation expired.
    pub completion: JoinHandle<CompletionOutcome>,
}

/// Submits collection and cleanup tasks to the worker fabric and applies
/// their responses when they arrive.
pub struct RemoteTaskDispatcher {
    store: Arc<dyn CollectionStore>,
    collaborators: Collaborators,
    lifecycle: Arc<LifecycleManager>,
    registry: Arc<CorrelationRegistry>,
    handler: Arc<CompletionHandler>,
    config: CollectorConfig,
}

impl RemoteTaskDispatcher {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        collaborators: Collaborators,
        lifecycle: Arc<LifecycleManager>,
        config: CollectorConfig,
    ) -> Self {
        let handler = Arc::new(CompletionHandler::new(store.clone(), lifecycle.clone()));
        Self {
            store,
            collaborators,
            lifecycle,
            registry: Arc::new(CorrelationRegistry::new()),
            handler,
            config,
        }
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Submit a task for `stream`. Returns immediately after submission.
    ///
    /// `Ok(None)` means nothing was submitted. A stream that already has a
    /// pending task of the same purpose is left alone; a missing connection,
    /// an invalid custom script or a rejected submission is recorded on the
    /// stream's failure counter.
    pub async fn dispatch(
        &self,
        stream: &ArtifactStream,
        purpose: TaskPurpose,
        correlation_hint: &str,
    ) -> CollectionResult<Option<DispatchTicket>> {
        if let Some(pending) = self.registry.pending_for(&stream.id, purpose) {
            debug!(
                "Stream {} already has {} task {} in flight, skipping",
                stream.id,
                purpose.as_str(),
                pending
            );
            return Ok(None);
        }

        let attributes = bound_attributes(
            stream,
            self.collaborators.services.as_ref(),
            &self.lifecycle,
        )
        .await?;

        let is_collection = purpose == TaskPurpose::Collection;
        let resolver = ParameterResolver {
            connections: self.collaborators.connections.as_ref(),
            secrets: self.collaborators.secrets.as_ref(),
            settings: &self.config.collection,
            custom_script_timeout_secs: self.config.dispatch.custom_script_timeout_secs,
        };
        let resolved = match resolver.resolve(stream, &attributes, is_collection) {
            Err(CollectionError::InvalidScript(reason)) => {
                warn!(
                    "Custom script of stream {} is invalid, skipping {}: {}",
                    stream.id,
                    purpose.as_str(),
                    reason
                );
                self.store.increment_failed_attempts(&stream.id)?;
                return Ok(None);
            }
            other => other?,
        };
        let Some(mut params) = resolved else {
            warn!(
                "Connection {:?} of stream {} no longer exists, skipping {}",
                stream.connection_id,
                stream.id,
                purpose.as_str()
            );
            self.store.increment_failed_attempts(&stream.id)?;
            return Ok(None);
        };

        if is_collection && params.request_kind == RequestKind::ListBuilds {
            let strategy = IdentityKeyStrategy::for_source(stream.source_type, &attributes);
            params = params.with_saved_keys(saved_keys(self.store.as_ref(), &stream.id, strategy)?);
        }

        let execution_timeout_secs = params
            .custom_script
            .as_ref()
            .map(|script| script.timeout_secs)
            .unwrap_or(self.config.dispatch.execution_timeout_secs);
        let extended = self
            .collaborators
            .flags
            .is_enabled(FeatureFlag::ExtendedDelegateQueueTimeout, &stream.account_id);
        let correlation_id = correlation_id(correlation_hint);

        let descriptor = TaskDescriptor {
            correlation_id: correlation_id.clone(),
            account_id: stream.account_id.clone(),
            app_id: stream.app_id.clone(),
            stream_id: stream.id.clone(),
            purpose,
            parameters: params,
            queue_timeout_ms: self.config.dispatch.queue_timeout(extended).as_millis() as u64,
            execution_timeout_secs,
        };

        let registration = self.registry.register(PendingTask {
            correlation_id: correlation_id.clone(),
            account_id: stream.account_id.clone(),
            stream_id: stream.id.clone(),
            purpose,
            attributes,
            registered_at: Instant::now(),
        });
        match registration {
            Registration::Registered => {}
            Registration::StreamBusy { correlation_id: pending } => {
                debug!(
                    "Stream {} already has {} task {} in flight, skipping",
                    stream.id,
                    purpose.as_str(),
                    pending
                );
                return Ok(None);
            }
            Registration::DuplicateId => {
                // the pending entry belongs to another submission and must survive
                warn!(
                    "Correlation id {} of stream {} is already pending, not submitting",
                    correlation_id, stream.id
                );
                return Err(CollectionError::Dispatch(format!(
                    "Correlation id {} is already pending",
                    correlation_id
                )));
            }
        }

        // The completion route must exist before the task can possibly finish.
        let (sender, receiver) = oneshot::channel();
        if let Err(e) = self.collaborators.worker.on_complete(&correlation_id, sender) {
            self.abandon(&correlation_id, &stream.id, &format!("{:#}", e))?;
            return Ok(None);
        }
        let task_id = match self.collaborators.worker.submit(descriptor).await {
            Ok(task_id) => task_id,
            Err(e) => {
                self.abandon(&correlation_id, &stream.id, &format!("{:#}", e))?;
                return Ok(None);
            }
        };

        info!(
            "Submitted {} task {} (correlation {}) for stream {}",
            purpose.as_str(),
            task_id,
            correlation_id,
            stream.id
        );
        metrics::record_dispatch(purpose.as_str());
        metrics::set_dispatches_in_flight(self.registry.len());

        let completion = self.await_completion(correlation_id.clone(), receiver);
        Ok(Some(DispatchTicket {
            correlation_id,
            task_id,
            completion,
        }))
    }

    fn abandon(&self, correlation_id: &str, stream_id: &str, reason: &str) -> CollectionResult<()> {
        self.registry.take(correlation_id);
        warn!(
            "Failed to submit task {} for stream {}: {}",
            correlation_id, stream_id, reason
        );
        self.store.increment_failed_attempts(stream_id)?;
        Ok(())
    }

    fn await_completion(
        &self,
        correlation_id: String,
        receiver: oneshot::Receiver<super::descriptor::TaskResponse>,
    ) -> JoinHandle<CompletionOutcome> {
        let registry = self.registry.clone();
        let handler = self.handler.clone();
        let timeout = self.config.dispatch.completion_timeout();

        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, receiver).await;
            let Some(task) = registry.take(&correlation_id) else {
                debug!("Correlation {} already settled, ignoring", correlation_id);
                return CompletionOutcome::Expired;
            };
            metrics::set_dispatches_in_flight(registry.len());

            let outcome = match result {
                Ok(Ok(response)) => handler.handle(&task, response).await,
                Ok(Err(_)) => handler.expire(&task, "completion channel closed"),
                Err(_) => handler.expire(
                    &task,
                    &format!("no response after {:?}", task.registered_at.elapsed()),
                ),
            };
            metrics::record_dispatch_completion(task.purpose.as_str(), outcome.label());
            outcome
        })
    }
}

fn correlation_id(hint: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    if hint.is_empty() {
        id
    } else {
        format!("{}-{}", hint, id)
    }
}
