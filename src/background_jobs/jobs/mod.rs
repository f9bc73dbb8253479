//! Periodic jobs driving collection, cleanup and polling-mode migration.

pub mod artifact_cleanup;
pub mod artifact_collection;
pub mod perpetual_task_migration;

pub use artifact_cleanup::ArtifactCleanupJob;
pub use artifact_collection::ArtifactCollectionJob;
pub use perpetual_task_migration::PerpetualTaskMigrationJob;
