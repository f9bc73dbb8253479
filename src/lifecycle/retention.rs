//! Retention-based deletion of downloaded artifact content.

use crate::collaborators::{DistributedLock, FileStore, LocalLockManager};
use crate::metrics;
use crate::source::ArtifactStream;
use crate::store::{Artifact, ArtifactStore, CollectionStore};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of deleting a batch of artifacts together with their files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub artifacts_deleted: usize,
    pub files_deleted: usize,
    pub file_failures: usize,
}

/// Delete stored files first, then the rows. A file that cannot be deleted is
/// logged and does not stop the batch.
pub(crate) async fn delete_with_files(
    store: &dyn CollectionStore,
    files: &dyn FileStore,
    artifacts: &[Artifact],
) -> Result<GcReport> {
    let mut report = GcReport::default();
    for artifact in artifacts {
        for file in &artifact.files {
            match files.delete(&file.file_id).await {
                Ok(()) => report.files_deleted += 1,
                Err(e) => {
                    report.file_failures += 1;
                    warn!(
                        "Failed to delete file {} of artifact {}: {}",
                        file.file_id, artifact.id, e
                    );
                }
            }
        }
    }
    let ids: Vec<String> = artifacts.iter().map(|a| a.id.clone()).collect();
    report.artifacts_deleted = store.delete_artifacts(&ids)?;
    Ok(report)
}

const RETENTION_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Keeps the newest `retention_size` downloaded artifacts of a stream.
///
/// Runs for the same stream are serialized, so a file is deleted by one run only.
#[derive(Clone)]
pub struct RetentionGc {
    store: Arc<dyn CollectionStore>,
    files: Arc<dyn FileStore>,
    retention_size: usize,
    locks: Arc<LocalLockManager>,
}

impl RetentionGc {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        files: Arc<dyn FileStore>,
        retention_size: usize,
    ) -> Self {
        Self {
            store,
            files,
            retention_size,
            locks: Arc::new(LocalLockManager::new()),
        }
    }

    pub fn retention_size(&self) -> usize {
        self.retention_size
    }

    /// Never fails: a batch-level error is logged with the stream id and batch size.
    pub async fn run(&self, stream: &ArtifactStream) -> GcReport {
        if stream.is_content_free() {
            debug!("Stream {} carries no content, skipping retention GC", stream.id);
            return GcReport::default();
        }

        let scope = format!("retention:{}", stream.id);
        let _guard = match self.locks.acquire(&scope, RETENTION_LOCK_TIMEOUT).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping retention GC of stream {}: {:#}", stream.id, e);
                return GcReport::default();
            }
        };

        let stale = match self
            .store
            .downloaded_beyond_retention(&stream.id, self.retention_size)
        {
            Ok(stale) => stale,
            Err(e) => {
                warn!("Failed to query retention candidates of stream {}: {}", stream.id, e);
                return GcReport::default();
            }
        };
        if stale.is_empty() {
            return GcReport::default();
        }

        match delete_with_files(self.store.as_ref(), self.files.as_ref(), &stale).await {
            Ok(report) => {
                info!(
                    "Retention GC removed {} artifacts ({} files, {} file failures) from stream {}",
                    report.artifacts_deleted, report.files_deleted, report.file_failures, stream.id
                );
                metrics::record_gc(report.artifacts_deleted, report.file_failures);
                report
            }
            Err(e) => {
                warn!(
                    "Retention GC of stream {} failed for a batch of {} artifacts: {}",
                    stream.id,
                    stale.len(),
                    e
                );
                GcReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockFileStore;
    use crate::source::SourceType;
    use crate::store::{
        ArtifactFile, ArtifactStatus, ArtifactStore, ContentStatus, SqliteCollectionStore,
        StreamStore,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// Yields on every delete so concurrent runs interleave.
    #[derive(Default)]
    struct SlowFileStore {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FileStore for SlowFileStore {
        async fn delete(&self, file_id: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.deleted.lock().unwrap().push(file_id.to_string());
            Ok(())
        }

        async fn download(&self, _file_id: &str, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn downloaded(stream: &ArtifactStream, n: i64) -> Artifact {
        Artifact {
            id: format!("a{}", n),
            account_id: stream.account_id.clone(),
            app_id: stream.app_id.clone(),
            stream_id: stream.id.clone(),
            source_name: stream.source_name.clone(),
            source_type: stream.source_type,
            display_name: format!("build {}", n),
            description: None,
            revision: None,
            ui_display_name: None,
            metadata: BTreeMap::new(),
            labels: BTreeMap::new(),
            status: ArtifactStatus::Ready,
            content_status: Some(ContentStatus::Downloaded),
            files: vec![ArtifactFile {
                file_id: format!("f{}", n),
                name: format!("app-{}.jar", n),
            }],
            created_at: n,
        }
    }

    fn seeded(count: i64) -> (Arc<SqliteCollectionStore>, ArtifactStream) {
        let store = Arc::new(SqliteCollectionStore::in_memory().unwrap());
        let stream = ArtifactStream::new("s1", "acc", SourceType::Jenkins, "job");
        store.create_stream(&stream).unwrap();
        for n in 0..count {
            store.insert_artifact(&downloaded(&stream, n), None).unwrap();
        }
        (store, stream)
    }

    #[tokio::test]
    async fn test_keeps_newest_and_deletes_each_file_once() {
        let (store, stream) = seeded(5);
        let mut files = MockFileStore::new();
        for id in ["f0", "f1", "f2"] {
            files
                .expect_delete()
                .withf(move |file_id| file_id == id)
                .times(1)
                .returning(|_| Ok(()));
        }

        let gc = RetentionGc::new(store.clone(), Arc::new(files), 2);
        let report = gc.run(&stream).await;

        assert_eq!(report.artifacts_deleted, 3);
        assert_eq!(report.files_deleted, 3);
        let remaining: Vec<_> = store
            .list_artifacts("s1")
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(remaining, vec!["a4", "a3"]);
    }

    #[tokio::test]
    async fn test_file_failure_does_not_stop_batch() {
        let (store, stream) = seeded(3);
        let mut files = MockFileStore::new();
        files
            .expect_delete()
            .returning(|file_id| {
                if file_id == "f0" {
                    Err(anyhow::anyhow!("storage offline"))
                } else {
                    Ok(())
                }
            });

        let gc = RetentionGc::new(store.clone(), Arc::new(files), 1);
        let report = gc.run(&stream).await;

        assert_eq!(report.artifacts_deleted, 2);
        assert_eq!(report.file_failures, 1);
        assert_eq!(store.count_artifacts("s1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_content_free_streams_are_skipped() {
        let (store, mut stream) = seeded(3);
        stream.metadata_only = true;
        let files = MockFileStore::new();

        let gc = RetentionGc::new(store.clone(), Arc::new(files), 1);
        assert_eq!(gc.run(&stream).await, GcReport::default());
        assert_eq!(store.count_artifacts("s1").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_runs_delete_each_file_once() {
        let (store, stream) = seeded(5);
        let files = Arc::new(SlowFileStore::default());
        let gc = RetentionGc::new(store.clone(), files.clone(), 2);

        let other = gc.clone();
        let (a, b) = tokio::join!(gc.run(&stream), other.run(&stream));

        assert_eq!(a.artifacts_deleted + b.artifacts_deleted, 3);
        let mut deleted = files.deleted.lock().unwrap().clone();
        deleted.sort();
        assert_eq!(deleted, vec!["f0", "f1", "f2"]);
        assert_eq!(store.count_artifacts("s1").unwrap(), 2);
    }
}
