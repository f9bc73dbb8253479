//! Artifact status machines, content-collection signalling and retention GC.

mod manager;
mod retention;
mod status;

pub use manager::{ContentCollectionQueue, ContentCollectionSignal, LifecycleManager, StartOutcome};
pub use retention::{GcReport, RetentionGc};
pub use status::initial_statuses;
