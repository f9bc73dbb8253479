use super::eligibility::MigrationEligibility;
use crate::collaborators::{PerpetualTaskClient, PerpetualTaskParams};
use crate::metrics;
use crate::source::ArtifactStream;
use crate::store::{CollectionStore, StreamStore};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of binding a perpetual task to one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(String),
    /// The stream already carries a task; nothing was created.
    AlreadyBound,
    /// Task creation failed; the stream stays on cron polling.
    CreateFailed,
    /// The task was created but could not be bound, and was deleted again.
    RolledBack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub attempted: usize,
    pub attached: usize,
    pub failed: usize,
}

/// Moves streams from cron polling to push-based perpetual tasks.
pub struct PollingModeMigrator {
    pub(super) store: Arc<dyn CollectionStore>,
    pub(super) perpetual_tasks: Arc<dyn PerpetualTaskClient>,
    eligibility: Arc<dyn MigrationEligibility>,
    batch_size: usize,
}

impl PollingModeMigrator {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        perpetual_tasks: Arc<dyn PerpetualTaskClient>,
        eligibility: Arc<dyn MigrationEligibility>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            perpetual_tasks,
            eligibility,
            batch_size,
        }
    }

    pub fn eligibility(&self) -> &dyn MigrationEligibility {
        self.eligibility.as_ref()
    }

    /// Create a perpetual task for `stream` and bind it.
    ///
    /// Binding only succeeds while the stream has no task. When it does not,
    /// the freshly created task is deleted so it cannot outlive its stream.
    /// Never fails: the stream keeps working under cron polling either way.
    pub async fn attach_perpetual_task(&self, stream: &ArtifactStream) -> AttachOutcome {
        if stream.has_perpetual_task() {
            return AttachOutcome::AlreadyBound;
        }

        let params = PerpetualTaskParams {
            stream_id: stream.id.clone(),
        };
        let created = self.perpetual_tasks.create(&stream.account_id, &params).await;
        metrics::record_perpetual_task_op("create", created.is_ok());
        let task_id = match created {
            Ok(task_id) => task_id,
            Err(e) => {
                warn!(
                    "Failed to create perpetual task for stream {}: {:#}",
                    stream.id, e
                );
                return AttachOutcome::CreateFailed;
            }
        };

        match self.store.attach_perpetual_task(&stream.id, &task_id) {
            Ok(true) => {
                info!("Attached perpetual task {} to stream {}", task_id, stream.id);
                AttachOutcome::Attached(task_id)
            }
            Ok(false) => {
                warn!(
                    "Stream {} changed concurrently, discarding perpetual task {}",
                    stream.id, task_id
                );
                self.discard(stream, &task_id).await;
                AttachOutcome::RolledBack
            }
            Err(e) => {
                warn!(
                    "Failed to attach perpetual task {} to stream {}: {}",
                    task_id, stream.id, e
                );
                self.discard(stream, &task_id).await;
                AttachOutcome::RolledBack
            }
        }
    }

    async fn discard(&self, stream: &ArtifactStream, task_id: &str) {
        let deleted = self.perpetual_tasks.delete(&stream.account_id, task_id).await;
        metrics::record_perpetual_task_op("delete", deleted.is_ok());
        if let Err(e) = deleted {
            warn!(
                "Failed to delete unbound perpetual task {} of stream {}: {:#}",
                task_id, stream.id, e
            );
        }
    }

    /// One bounded migration pass over eligible streams without a task.
    pub async fn run_pass(&self) -> Result<MigrationReport> {
        let accounts = self.eligibility.eligible_accounts();
        if accounts.as_ref().is_some_and(|accounts| accounts.is_empty()) {
            debug!("No accounts eligible for perpetual task migration");
            return Ok(MigrationReport::default());
        }

        let streams = self
            .store
            .list_streams_without_perpetual_task(accounts.as_ref(), self.batch_size)?;
        let mut report = MigrationReport {
            attempted: streams.len(),
            ..Default::default()
        };
        for stream in &streams {
            match self.attach_perpetual_task(stream).await {
                AttachOutcome::Attached(_) => report.attached += 1,
                AttachOutcome::AlreadyBound => {}
                AttachOutcome::CreateFailed | AttachOutcome::RolledBack => report.failed += 1,
            }
        }

        if report.attempted > 0 {
            info!(
                "Perpetual task migration: {} attached, {} failed of {} streams",
                report.attached, report.failed, report.attempted
            );
        }
        Ok(report)
    }
}
