//! Artifact Collector Library
//!
//! Discovers new builds of configured artifact sources, materializes them as
//! artifacts, drives their status and retention lifecycle, and moves streams
//! between cron and perpetual-task polling.

pub mod background_jobs;
pub mod collaborators;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod polling;
pub mod source;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use collaborators::Collaborators;
pub use collector::{Collector, SourceConnector};
pub use config::CollectorConfig;
pub use coordinator::CollectionCoordinator;
pub use dispatch::RemoteTaskDispatcher;
pub use error::{CollectionError, CollectionResult};
pub use lifecycle::LifecycleManager;
pub use polling::PollingModeMigrator;
pub use store::{CollectionStore, SqliteCollectionStore};
