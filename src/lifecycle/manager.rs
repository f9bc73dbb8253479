use super::retention::{delete_with_files, GcReport, RetentionGc};
use super::status::initial_statuses;
use crate::collaborators::FileStore;
use crate::metrics;
use crate::source::{
    artifact_display_name, artifact_metadata, ArtifactStream, BuildDetails, IdentityKeyStrategy,
    StreamAttributes,
};
use crate::store::{
    Artifact, ArtifactFile, ArtifactStatus, ArtifactStore, CollectionStore, ContentStatus,
    StreamStore,
};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Request to fetch the binary content of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCollectionSignal {
    pub artifact_id: String,
    pub stream_id: String,
}

/// Producer side of the content-collection queue.
#[derive(Clone)]
pub struct ContentCollectionQueue {
    sender: mpsc::UnboundedSender<ContentCollectionSignal>,
}

impl ContentCollectionQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ContentCollectionSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, artifact: &Artifact) {
        let signal = ContentCollectionSignal {
            artifact_id: artifact.id.clone(),
            stream_id: artifact.stream_id.clone(),
        };
        if self.sender.send(signal).is_err() {
            warn!(
                "Content collection queue is closed, dropping signal for artifact {}",
                artifact.id
            );
        }
    }
}

/// Result of [`LifecycleManager::start_content_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Missing,
    /// Already queued or running.
    InFlight,
    /// Files were present without a content status; marked approved and downloaded.
    Normalized,
    /// Content status already settled or in progress.
    Unchanged,
    Enqueued,
}

/// Owns both status axes of every artifact and the deletion of their content.
pub struct LifecycleManager {
    store: Arc<dyn CollectionStore>,
    files: Arc<dyn FileStore>,
    queue: ContentCollectionQueue,
    retention: RetentionGc,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        files: Arc<dyn FileStore>,
        queue: ContentCollectionQueue,
        retention_size: usize,
    ) -> Self {
        let retention = RetentionGc::new(store.clone(), files.clone(), retention_size);
        Self {
            store,
            files,
            queue,
            retention,
        }
    }

    /// Materialize builds as artifacts of `stream`.
    ///
    /// Builds whose dedup key is already stored, or that carry no key at all,
    /// are skipped. Every new QUEUED
    /// artifact is signalled for content collection once, and retention GC is
    /// spawned for content-bearing streams.
    pub async fn create_artifacts(
        &self,
        stream: &ArtifactStream,
        attributes: &StreamAttributes,
        builds: Vec<BuildDetails>,
    ) -> Result<Vec<Artifact>> {
        let strategy = IdentityKeyStrategy::for_source(stream.source_type, attributes);
        let now = Utc::now();
        let mut created = Vec::new();

        for build in &builds {
            let artifact = new_artifact(stream, attributes, build, now);
            let Some(dedup_key) = strategy.stored_key(&artifact.key_fields()).map(String::from)
            else {
                warn!(
                    "Build {} of stream {} has no {:?} key, skipping",
                    build.number, stream.id, strategy
                );
                continue;
            };
            let inserted = self
                .store
                .insert_artifact(&artifact, Some(dedup_key.as_str()))
                .with_context(|| format!("Failed to store build {} of stream {}", build.number, stream.id))?;
            if !inserted {
                debug!(
                    "Build {} of stream {} already collected",
                    build.number, stream.id
                );
                continue;
            }
            if artifact.status == ArtifactStatus::Queued {
                self.queue.send(&artifact);
            }
            created.push(artifact);
        }

        if !created.is_empty() {
            info!(
                "Created {} artifacts for stream {} ({})",
                created.len(),
                stream.id,
                stream.source_type.as_str()
            );
            metrics::record_artifacts_created(stream.source_type.as_str(), created.len());
            if !stream.is_content_free() {
                let retention = self.retention.clone();
                let stream = stream.clone();
                tokio::spawn(async move {
                    retention.run(&stream).await;
                });
            }
        }
        Ok(created)
    }

    pub async fn run_retention(&self, stream: &ArtifactStream) -> GcReport {
        self.retention.run(stream).await
    }

    pub fn start_content_collection(&self, artifact_id: &str) -> Result<StartOutcome> {
        let Some(artifact) = self.store.get_artifact(artifact_id)? else {
            return Ok(StartOutcome::Missing);
        };
        if artifact.status.is_in_flight() {
            debug!("Content collection of artifact {} already in flight", artifact_id);
            return Ok(StartOutcome::InFlight);
        }
        match artifact.content_status {
            None if !artifact.files.is_empty() => {
                self.store.set_statuses(
                    artifact_id,
                    ArtifactStatus::Approved,
                    Some(ContentStatus::Downloaded),
                )?;
                Ok(StartOutcome::Normalized)
            }
            Some(ContentStatus::Downloading)
            | Some(ContentStatus::Downloaded)
            | Some(ContentStatus::MetadataOnly)
            | Some(ContentStatus::Deleted) => Ok(StartOutcome::Unchanged),
            _ => {
                self.queue.send(&artifact);
                Ok(StartOutcome::Enqueued)
            }
        }
    }

    /// Effective content status, accounting for vanished streams and stored files.
    pub fn content_status(&self, artifact: &Artifact) -> Result<ContentStatus> {
        let Some(stream) = self.store.get_stream(&artifact.stream_id)? else {
            return Ok(ContentStatus::Deleted);
        };
        if stream.metadata_only {
            return Ok(ContentStatus::MetadataOnly);
        }
        if let Some(status) = artifact.content_status {
            return Ok(status);
        }
        if artifact.files.is_empty() {
            Ok(ContentStatus::NotDownloaded)
        } else {
            Ok(ContentStatus::Downloaded)
        }
    }

    /// Move an artifact along its workflow state machine.
    pub fn transition(&self, artifact_id: &str, next: ArtifactStatus) -> Result<bool> {
        let Some(artifact) = self.store.get_artifact(artifact_id)? else {
            return Ok(false);
        };
        if !artifact.status.can_transition_to(next) {
            bail!(
                "Invalid status transition {} -> {} for artifact {}",
                artifact.status.as_db_str(),
                next.as_db_str(),
                artifact_id
            );
        }
        self.store.update_status_if(artifact_id, artifact.status, next)
    }

    /// NOT_DOWNLOADED (or unset) -> DOWNLOADING. False when another caller won.
    pub fn begin_content_download(&self, artifact_id: &str) -> Result<bool> {
        let Some(artifact) = self.store.get_artifact(artifact_id)? else {
            return Ok(false);
        };
        match artifact.content_status {
            None | Some(ContentStatus::NotDownloaded) => self.store.update_content_status_if(
                artifact_id,
                artifact.content_status,
                ContentStatus::Downloading,
            ),
            _ => Ok(false),
        }
    }

    /// Attach downloaded files and mark the content DOWNLOADED.
    pub fn complete_content_download(
        &self,
        artifact_id: &str,
        files: &[ArtifactFile],
    ) -> Result<bool> {
        for file in files {
            self.store.add_file(artifact_id, file)?;
        }
        self.store.update_content_status_if(
            artifact_id,
            Some(ContentStatus::Downloading),
            ContentStatus::Downloaded,
        )
    }

    /// Return a failed download to NOT_DOWNLOADED so it can be retried.
    pub fn fail_content_download(&self, artifact_id: &str) -> Result<bool> {
        self.store.update_content_status_if(
            artifact_id,
            Some(ContentStatus::Downloading),
            ContentStatus::NotDownloaded,
        )
    }

    /// Copy an artifact's stored files into `dest_dir`, returning their paths.
    pub async fn download_content(&self, artifact_id: &str, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let artifact = self
            .store
            .get_artifact(artifact_id)?
            .with_context(|| format!("Artifact {} not found", artifact_id))?;
        let mut paths = Vec::with_capacity(artifact.files.len());
        for file in &artifact.files {
            let dest = dest_dir.join(&file.name);
            self.files
                .download(&file.file_id, &dest)
                .await
                .with_context(|| format!("Failed to download file {}", file.file_id))?;
            paths.push(dest);
        }
        Ok(paths)
    }

    pub async fn delete_artifacts(&self, artifacts: &[Artifact]) -> Result<GcReport> {
        if artifacts.is_empty() {
            return Ok(GcReport::default());
        }
        delete_with_files(self.store.as_ref(), self.files.as_ref(), artifacts).await
    }

    pub async fn delete_all_artifacts(&self, stream_id: &str) -> Result<GcReport> {
        let artifacts = self.store.list_artifacts(stream_id)?;
        self.delete_artifacts(&artifacts).await
    }

    /// Remove a stream together with its artifacts and their stored files.
    pub async fn purge_stream(&self, stream_id: &str) -> Result<bool> {
        let report = self.delete_all_artifacts(stream_id).await?;
        let deleted = self.store.delete_stream(stream_id)?;
        info!(
            "Purged stream {} ({} artifacts, {} files)",
            stream_id, report.artifacts_deleted, report.files_deleted
        );
        Ok(deleted)
    }
}

fn new_artifact(
    stream: &ArtifactStream,
    attributes: &StreamAttributes,
    build: &BuildDetails,
    now: DateTime<Utc>,
) -> Artifact {
    let (status, content_status) = initial_statuses(stream, attributes);
    Artifact {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: stream.account_id.clone(),
        app_id: stream.app_id.clone(),
        stream_id: stream.id.clone(),
        source_name: stream.source_name.clone(),
        source_type: stream.source_type,
        display_name: artifact_display_name(stream, build, now),
        description: build.description.clone(),
        revision: build.revision.clone(),
        ui_display_name: build.ui_display_name.clone(),
        metadata: artifact_metadata(stream, build),
        labels: build.labels.clone(),
        status,
        content_status,
        files: Vec::new(),
        created_at: now.timestamp_millis(),
    }
}
