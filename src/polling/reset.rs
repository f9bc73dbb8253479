use super::migrator::PollingModeMigrator;
use crate::collaborators::{PerpetualTaskParams, SourceConnection};
use crate::metrics;
use crate::source::ArtifactStream;
use crate::store::StreamStore;
use anyhow::Result;
use futures::future::join_all;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub reset: usize,
    /// Streams whose task could not be reset.
    pub failed: Vec<String>,
}

impl PollingModeMigrator {
    /// Reset the perpetual task of every stream backed by `connection`, so the
    /// workers pick up the new credentials. One failed reset does not stop the
    /// others.
    pub async fn on_connection_changed(&self, connection: &SourceConnection) -> Result<ResetReport> {
        let streams = self.store.list_streams_by_connection(&connection.id)?;
        let bound: Vec<&ArtifactStream> =
            streams.iter().filter(|s| s.has_perpetual_task()).collect();
        if bound.is_empty() {
            return Ok(ResetReport::default());
        }

        let results = join_all(bound.iter().map(|stream| self.reset_task(stream))).await;

        let mut report = ResetReport::default();
        for (stream, ok) in bound.iter().zip(results) {
            if ok {
                report.reset += 1;
            } else {
                report.failed.push(stream.id.clone());
            }
        }
        info!(
            "Connection {} changed: reset {} perpetual tasks, {} failed",
            connection.id,
            report.reset,
            report.failed.len()
        );
        Ok(report)
    }

    async fn reset_task(&self, stream: &ArtifactStream) -> bool {
        let Some(task_id) = stream.perpetual_task_id.as_deref() else {
            return false;
        };
        let params = PerpetualTaskParams {
            stream_id: stream.id.clone(),
        };
        let result = self
            .perpetual_tasks
            .reset(&stream.account_id, task_id, &params)
            .await;
        metrics::record_perpetual_task_op("reset", matches!(result, Ok(true)));
        match result {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    "Perpetual task {} of stream {} was not reset",
                    task_id, stream.id
                );
                false
            }
            Err(e) => {
                warn!(
                    "Failed to reset perpetual task {} of stream {}: {:#}",
                    task_id, stream.id, e
                );
                false
            }
        }
    }
}
