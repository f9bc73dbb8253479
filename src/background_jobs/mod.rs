//! Background job scheduling and execution.
//!
//! Jobs run on fixed intervals on the tokio runtime and are cancelled through
//! a shared `CancellationToken` on shutdown.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::JobScheduler;
