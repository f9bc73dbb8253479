//! Periodic pruning of artifacts whose builds vanished from their source.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::coordinator::CollectionCoordinator;
use crate::store::{StreamCursor, StreamStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ArtifactCleanupJob {
    coordinator: Arc<CollectionCoordinator>,
    interval: Duration,
    page_size: usize,
}

impl ArtifactCleanupJob {
    pub fn new(coordinator: Arc<CollectionCoordinator>, interval: Duration, page_size: usize) -> Self {
        Self {
            coordinator,
            interval,
            page_size,
        }
    }
}

#[async_trait]
impl BackgroundJob for ArtifactCleanupJob {
    fn id(&self) -> &'static str {
        "artifact_cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete artifacts whose builds no longer exist in their source"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Delayed(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let mut cursor: Option<StreamCursor> = None;
        let mut visited = 0;
        let mut dispatched = 0;

        loop {
            let streams = ctx
                .store
                .list_streams(cursor.as_ref(), self.page_size)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
            if streams.is_empty() {
                break;
            }
            visited += streams.len();
            cursor = streams.last().map(StreamCursor::after);

            for stream in streams.iter().filter(|s| s.profile().supports_cleanup) {
                if ctx.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                match self.coordinator.cleanup_artifacts_async(stream).await {
                    Ok(Some(_)) => dispatched += 1,
                    Ok(None) => {}
                    Err(e) => warn!("Cleanup of stream {} failed: {}", stream.id, e),
                }
            }
        }

        info!(
            "Artifact cleanup submitted {} tasks over {} streams",
            dispatched, visited
        );
        Ok(())
    }
}
