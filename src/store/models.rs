//! Artifact records and their two status axes.

use crate::source::{metadata::keys, KeyFields, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Approval/workflow state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    New,
    Queued,
    Running,
    Waiting,
    Ready,
    Approved,
    Rejected,
    Aborted,
    Failed,
    Error,
}

impl ArtifactStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ArtifactStatus::New => "NEW",
            ArtifactStatus::Queued => "QUEUED",
            ArtifactStatus::Running => "RUNNING",
            ArtifactStatus::Waiting => "WAITING",
            ArtifactStatus::Ready => "READY",
            ArtifactStatus::Approved => "APPROVED",
            ArtifactStatus::Rejected => "REJECTED",
            ArtifactStatus::Aborted => "ABORTED",
            ArtifactStatus::Failed => "FAILED",
            ArtifactStatus::Error => "ERROR",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "QUEUED" => ArtifactStatus::Queued,
            "RUNNING" => ArtifactStatus::Running,
            "WAITING" => ArtifactStatus::Waiting,
            "READY" => ArtifactStatus::Ready,
            "APPROVED" => ArtifactStatus::Approved,
            "REJECTED" => ArtifactStatus::Rejected,
            "ABORTED" => ArtifactStatus::Aborted,
            "FAILED" => ArtifactStatus::Failed,
            "ERROR" => ArtifactStatus::Error,
            _ => ArtifactStatus::New,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArtifactStatus::Ready
                | ArtifactStatus::Approved
                | ArtifactStatus::Rejected
                | ArtifactStatus::Aborted
                | ArtifactStatus::Failed
                | ArtifactStatus::Error
        )
    }

    /// Content fetch for this artifact is queued or under way.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ArtifactStatus::Queued | ArtifactStatus::Running)
    }

    pub fn can_transition_to(&self, next: ArtifactStatus) -> bool {
        use ArtifactStatus::*;
        match self {
            New => matches!(next, Queued | Approved),
            Queued => matches!(next, Running | Approved),
            Running => matches!(
                next,
                Ready | Waiting | Rejected | Aborted | Failed | Error
            ),
            Waiting => matches!(next, Running | Ready | Rejected | Aborted | Failed | Error),
            _ => false,
        }
    }
}

/// Download state of an artifact's binary content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    NotDownloaded,
    Downloading,
    Downloaded,
    MetadataOnly,
    Deleted,
}

impl ContentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ContentStatus::NotDownloaded => "NOT_DOWNLOADED",
            ContentStatus::Downloading => "DOWNLOADING",
            ContentStatus::Downloaded => "DOWNLOADED",
            ContentStatus::MetadataOnly => "METADATA_ONLY",
            ContentStatus::Deleted => "DELETED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "NOT_DOWNLOADED" => Some(ContentStatus::NotDownloaded),
            "DOWNLOADING" => Some(ContentStatus::Downloading),
            "DOWNLOADED" => Some(ContentStatus::Downloaded),
            "METADATA_ONLY" => Some(ContentStatus::MetadataOnly),
            "DELETED" => Some(ContentStatus::Deleted),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        if next == Deleted {
            return *self != Deleted;
        }
        matches!(
            (self, next),
            (NotDownloaded, Downloading) | (Downloading, Downloaded) | (Downloading, NotDownloaded)
        )
    }
}

/// Stored binary belonging to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Id of the blob in the file store.
    pub file_id: String,
    pub name: String,
}

/// One collected build-version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub account_id: String,
    pub app_id: String,
    pub stream_id: String,
    /// Stream source name at collection time.
    pub source_name: String,
    pub source_type: SourceType,
    pub display_name: String,
    pub description: Option<String>,
    pub revision: Option<String>,
    pub ui_display_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub status: ArtifactStatus,
    pub content_status: Option<ContentStatus>,
    pub files: Vec<ArtifactFile>,
    /// Milliseconds since epoch.
    pub created_at: i64,
}

impl Artifact {
    pub fn build_no(&self) -> Option<&str> {
        self.metadata.get(keys::BUILD_NO).map(String::as_str)
    }

    pub fn artifact_path(&self) -> Option<&str> {
        self.metadata.get(keys::ARTIFACT_PATH).map(String::as_str)
    }

    pub fn key_fields(&self) -> KeyFields {
        KeyFields {
            revision: self.revision.clone(),
            build_no: self.build_no().map(String::from),
            artifact_path: self.artifact_path().map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_set() {
        let terminal: Vec<_> = [
            ArtifactStatus::New,
            ArtifactStatus::Queued,
            ArtifactStatus::Running,
            ArtifactStatus::Waiting,
            ArtifactStatus::Ready,
            ArtifactStatus::Approved,
            ArtifactStatus::Rejected,
            ArtifactStatus::Aborted,
            ArtifactStatus::Failed,
            ArtifactStatus::Error,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![
                ArtifactStatus::Ready,
                ArtifactStatus::Approved,
                ArtifactStatus::Rejected,
                ArtifactStatus::Aborted,
                ArtifactStatus::Failed,
                ArtifactStatus::Error
            ]
        );
    }

    #[test]
    fn test_status_transitions() {
        assert!(ArtifactStatus::New.can_transition_to(ArtifactStatus::Queued));
        assert!(ArtifactStatus::Queued.can_transition_to(ArtifactStatus::Approved));
        assert!(ArtifactStatus::Queued.can_transition_to(ArtifactStatus::Running));
        assert!(ArtifactStatus::Running.can_transition_to(ArtifactStatus::Ready));
        assert!(!ArtifactStatus::Queued.can_transition_to(ArtifactStatus::Ready));
        assert!(!ArtifactStatus::Approved.can_transition_to(ArtifactStatus::Queued));
        assert!(!ArtifactStatus::Failed.can_transition_to(ArtifactStatus::Running));
    }

    #[test]
    fn test_content_transitions() {
        assert!(ContentStatus::NotDownloaded.can_transition_to(ContentStatus::Downloading));
        assert!(ContentStatus::Downloading.can_transition_to(ContentStatus::Downloaded));
        assert!(ContentStatus::Downloaded.can_transition_to(ContentStatus::Deleted));
        assert!(ContentStatus::MetadataOnly.can_transition_to(ContentStatus::Deleted));
        assert!(!ContentStatus::MetadataOnly.can_transition_to(ContentStatus::Downloading));
        assert!(!ContentStatus::Downloaded.can_transition_to(ContentStatus::NotDownloaded));
        assert!(!ContentStatus::Deleted.can_transition_to(ContentStatus::Deleted));
    }

    #[test]
    fn test_db_strings() {
        assert_eq!(
            ArtifactStatus::from_db_str(ArtifactStatus::Waiting.as_db_str()),
            ArtifactStatus::Waiting
        );
        assert_eq!(
            ContentStatus::from_db_str(ContentStatus::MetadataOnly.as_db_str()),
            Some(ContentStatus::MetadataOnly)
        );
        assert_eq!(ContentStatus::from_db_str(""), None);
    }
}
