//! Cron-driven delegated collection over every stream.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::coordinator::CollectionCoordinator;
use crate::store::{StreamCursor, StreamStore};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Submits a collection task for every stream the skip policy lets through.
/// Streams owned by a perpetual task are skipped by the coordinator.
pub struct ArtifactCollectionJob {
    coordinator: Arc<CollectionCoordinator>,
    interval: Duration,
    page_size: usize,
}

impl ArtifactCollectionJob {
    pub fn new(coordinator: Arc<CollectionCoordinator>, interval: Duration, page_size: usize) -> Self {
        Self {
            coordinator,
            interval,
            page_size,
        }
    }
}

#[async_trait]
impl BackgroundJob for ArtifactCollectionJob {
    fn id(&self) -> &'static str {
        "artifact_collection"
    }

    fn description(&self) -> &'static str {
        "Collect new builds of every artifact stream"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let mut cursor: Option<StreamCursor> = None;
        let mut visited = 0;
        let mut dispatched = 0;
        let mut failed = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let streams = ctx
                .store
                .list_streams(cursor.as_ref(), self.page_size)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
            if streams.is_empty() {
                break;
            }
            visited += streams.len();
            cursor = streams.last().map(StreamCursor::after);

            let results = join_all(streams.iter().map(|stream| {
                self.coordinator
                    .collect_new_artifacts_async(&stream.id, "cron")
            }))
            .await;
            for (stream, result) in streams.iter().zip(results) {
                match result {
                    Ok(Some(_)) => dispatched += 1,
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Collection of stream {} failed: {}", stream.id, e);
                        failed += 1;
                    }
                }
            }
        }

        info!(
            "Artifact collection submitted {} tasks over {} streams ({} failed)",
            dispatched, visited, failed
        );
        Ok(())
    }
}
