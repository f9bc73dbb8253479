mod models;
mod schema;
mod sqlite_collection_store;

pub use models::*;
pub use schema::COLLECTION_VERSIONED_SCHEMAS;
pub use sqlite_collection_store::SqliteCollectionStore;

use crate::source::{ArtifactStream, CollectionStatus, KeyFields};
use anyhow::Result;
use std::collections::BTreeSet;

/// Position of a stream in `created_at, id` order; pages resume strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    pub created_at: i64,
    pub id: String,
}

impl StreamCursor {
    pub fn after(stream: &ArtifactStream) -> Self {
        Self {
            created_at: stream.created_at,
            id: stream.id.clone(),
        }
    }
}

/// Persistence of artifact stream configuration and polling state.
///
/// Every mutation of `failed_cron_attempts` and `perpetual_task_id` is a
/// single conditional update scoped by stream id. Boolean results report
/// whether a row was changed.
pub trait StreamStore: Send + Sync {
    fn create_stream(&self, stream: &ArtifactStream) -> Result<()>;
    fn get_stream(&self, stream_id: &str) -> Result<Option<ArtifactStream>>;
    /// Next page in `created_at, id` order. Streams deleted between pages do
    /// not shift the ones that follow.
    fn list_streams(&self, after: Option<&StreamCursor>, limit: usize) -> Result<Vec<ArtifactStream>>;
    fn list_streams_by_connection(&self, connection_id: &str) -> Result<Vec<ArtifactStream>>;

    /// Streams without a bound perpetual task, optionally restricted to `accounts`.
    fn list_streams_without_perpetual_task(
        &self,
        accounts: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<Vec<ArtifactStream>>;

    /// Deletes the stream; its artifacts and their file rows cascade.
    fn delete_stream(&self, stream_id: &str) -> Result<bool>;

    // Polling state
    fn increment_failed_attempts(&self, stream_id: &str) -> Result<bool>;
    fn record_successful_iteration(&self, stream_id: &str, at_millis: i64) -> Result<bool>;
    fn update_collection_status(&self, stream_id: &str, status: CollectionStatus) -> Result<bool>;
    /// STOPPED -> UNSTABLE with a zeroed failure counter.
    fn reset_stopped_collection(&self, stream_id: &str) -> Result<bool>;

    /// Binds `task_id` only when the stream has no task yet.
    fn attach_perpetual_task(&self, stream_id: &str, task_id: &str) -> Result<bool>;
    /// Unbinds only when the stream is still bound to `task_id`.
    fn detach_perpetual_task(&self, stream_id: &str, task_id: &str) -> Result<bool>;
}

/// Persistence of collected artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Insert unless an artifact with the same dedup key already exists for the
    /// stream. Returns whether a row was written.
    fn insert_artifact(&self, artifact: &Artifact, dedup_key: Option<&str>) -> Result<bool>;
    fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>>;
    /// Newest first.
    fn list_artifacts(&self, stream_id: &str) -> Result<Vec<Artifact>>;
    fn count_artifacts(&self, stream_id: &str) -> Result<usize>;

    /// Dedup projection of every stored artifact; full records are not loaded.
    fn existing_key_projections(&self, stream_id: &str) -> Result<Vec<KeyFields>>;

    /// Compare-and-set on the workflow status.
    fn update_status_if(
        &self,
        artifact_id: &str,
        expected: ArtifactStatus,
        next: ArtifactStatus,
    ) -> Result<bool>;

    /// Compare-and-set on the content status.
    fn update_content_status_if(
        &self,
        artifact_id: &str,
        expected: Option<ContentStatus>,
        next: ContentStatus,
    ) -> Result<bool>;

    /// Unconditional write of both axes.
    fn set_statuses(
        &self,
        artifact_id: &str,
        status: ArtifactStatus,
        content_status: Option<ContentStatus>,
    ) -> Result<bool>;

    fn add_file(&self, artifact_id: &str, file: &ArtifactFile) -> Result<()>;

    /// Downloaded artifacts of the stream past the `keep` most recent ones.
    fn downloaded_beyond_retention(&self, stream_id: &str, keep: usize) -> Result<Vec<Artifact>>;

    fn delete_artifacts(&self, artifact_ids: &[String]) -> Result<usize>;
}

/// Both stores behind one handle.
pub trait CollectionStore: StreamStore + ArtifactStore {}

impl<T: StreamStore + ArtifactStore> CollectionStore for T {}
