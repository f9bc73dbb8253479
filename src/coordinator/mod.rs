//! Cron-facing entry points: skip policy, per-stream locking and failure
//! accounting around the synchronous and delegated collection paths.

mod service;
mod skip;

pub use service::CollectionCoordinator;
pub use skip::{SkipPolicy, SkipReason};
