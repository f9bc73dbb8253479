use crate::collaborators::{Collaborators, ConnectivityState, FeatureFlag};
use crate::dispatch::TaskPurpose;
use crate::error::{CollectionError, CollectionResult};
use crate::metrics;
use crate::source::{ArtifactStream, CollectionStatus};
use crate::store::{CollectionStore, StreamStore};
use tracing::{debug, info, warn};

/// Why a stream was left alone by a cron-triggered run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Push-based polling owns the stream.
    PerpetualTaskBound,
    /// The perpetual-task feature was turned off but the stale task could not be removed.
    StalePerpetualTask,
    TooManyFailures { failed_attempts: i64 },
    NoAccount,
    ConnectivityError(String),
    /// Template-driven stream resolved only at deployment time.
    Parameterized,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::PerpetualTaskBound => write!(f, "perpetual task is bound"),
            SkipReason::StalePerpetualTask => write!(f, "stale perpetual task could not be removed"),
            SkipReason::TooManyFailures { failed_attempts } => {
                write!(f, "{} failed attempts", failed_attempts)
            }
            SkipReason::NoAccount => write!(f, "no account"),
            SkipReason::ConnectivityError(error) => write!(f, "connectivity error: {}", error),
            SkipReason::Parameterized => write!(f, "parameterized stream"),
        }
    }
}

/// Decides whether a cron-triggered collection or cleanup should leave a stream alone.
pub struct SkipPolicy<'a> {
    pub store: &'a dyn CollectionStore,
    pub collaborators: &'a Collaborators,
    pub max_failed_attempts: i64,
}

impl SkipPolicy<'_> {
    /// `Ok(None)` means the stream should be processed. A stale perpetual task
    /// removed along the way is also cleared on `stream`.
    ///
    /// A non-custom stream whose connection is gone fails with
    /// `InvalidConnection`.
    pub async fn check(
        &self,
        stream: &mut ArtifactStream,
        purpose: TaskPurpose,
    ) -> CollectionResult<Option<SkipReason>> {
        if let Some(task_id) = stream.perpetual_task_id.clone().filter(|id| !id.is_empty()) {
            let perpetual_enabled = self
                .collaborators
                .flags
                .is_enabled(FeatureFlag::ArtifactPerpetualTask, &stream.account_id);
            if perpetual_enabled {
                if purpose == TaskPurpose::Collection {
                    return Ok(Some(SkipReason::PerpetualTaskBound));
                }
            } else if self.remove_stale_task(stream, &task_id).await {
                stream.perpetual_task_id = None;
            } else {
                return Ok(Some(SkipReason::StalePerpetualTask));
            }
        }

        if stream.failed_cron_attempts > self.max_failed_attempts {
            let configurable = self
                .collaborators
                .flags
                .is_enabled(FeatureFlag::ArtifactCollectionConfigurable, &stream.account_id);
            if configurable && stream.collection_status != CollectionStatus::Stopped {
                info!(
                    "Stopping collection of stream {} after {} failed attempts",
                    stream.id, stream.failed_cron_attempts
                );
                self.store
                    .update_collection_status(&stream.id, CollectionStatus::Stopped)?;
            }
            return Ok(Some(SkipReason::TooManyFailures {
                failed_attempts: stream.failed_cron_attempts,
            }));
        }

        if stream.account_id.is_empty() {
            return Ok(Some(SkipReason::NoAccount));
        }

        if !stream.source_type.is_custom() {
            let connection_id = stream.connection_id.clone().unwrap_or_default();
            let state = if connection_id.is_empty() {
                ConnectivityState::Missing
            } else {
                self.collaborators.connections.connectivity(&connection_id)?
            };
            match state {
                ConnectivityState::Missing => {
                    return Err(CollectionError::InvalidConnection { connection_id });
                }
                ConnectivityState::Failing(error) => {
                    return Ok(Some(SkipReason::ConnectivityError(error)));
                }
                ConnectivityState::Healthy => {}
            }
        }

        if stream.parameterized {
            return Ok(Some(SkipReason::Parameterized));
        }

        Ok(None)
    }

    /// Delete the remote task and unbind it. Returns whether cron collection may proceed.
    async fn remove_stale_task(&self, stream: &ArtifactStream, task_id: &str) -> bool {
        debug!(
            "Perpetual tasks disabled for account {}, removing task {} from stream {}",
            stream.account_id, task_id, stream.id
        );
        let deleted = self
            .collaborators
            .perpetual_tasks
            .delete(&stream.account_id, task_id)
            .await;
        metrics::record_perpetual_task_op("delete", deleted.is_ok());
        if let Err(e) = deleted {
            warn!(
                "Failed to delete perpetual task {} of stream {}: {:#}",
                task_id, stream.id, e
            );
            return false;
        }
        match self.store.detach_perpetual_task(&stream.id, task_id) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Failed to detach perpetual task {} from stream {}: {}",
                    task_id, stream.id, e
                );
                false
            }
        }
    }
}
