use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::polling::PollingModeMigrator;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One bounded migration pass per interval.
pub struct PerpetualTaskMigrationJob {
    migrator: Arc<PollingModeMigrator>,
    interval: Duration,
}

impl PerpetualTaskMigrationJob {
    pub fn new(migrator: Arc<PollingModeMigrator>, interval: Duration) -> Self {
        Self { migrator, interval }
    }
}

#[async_trait]
impl BackgroundJob for PerpetualTaskMigrationJob {
    fn id(&self) -> &'static str {
        "perpetual_task_migration"
    }

    fn description(&self) -> &'static str {
        "Move eligible artifact streams to perpetual-task polling"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Delayed(self.interval)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // an interrupted create/attach pair could leave an unbound task
        ShutdownBehavior::WaitForCompletion
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        self.migrator
            .run_pass()
            .await
            .map(|_| ())
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))
    }
}
