use crate::source::{ArtifactStream, SourceType, StreamAttributes};
use crate::store::{ArtifactStatus, ContentStatus};

/// (status, content status) an artifact is created with.
///
/// `attributes` are the stream attributes after the bound service's
/// artifact type has been applied.
pub fn initial_statuses(
    stream: &ArtifactStream,
    attributes: &StreamAttributes,
) -> (ArtifactStatus, Option<ContentStatus>) {
    if stream.is_content_free() {
        return (ArtifactStatus::Approved, Some(ContentStatus::MetadataOnly));
    }
    match stream.source_type {
        SourceType::Nexus => {
            let content = if attributes.is_registry_image() {
                ContentStatus::MetadataOnly
            } else {
                ContentStatus::NotDownloaded
            };
            (ArtifactStatus::Approved, Some(content))
        }
        SourceType::Artifactory if attributes.is_registry_image() => {
            (ArtifactStatus::Approved, Some(ContentStatus::MetadataOnly))
        }
        _ if stream.auto_approve => (ArtifactStatus::Approved, Some(ContentStatus::NotDownloaded)),
        _ => (ArtifactStatus::Queued, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ArtifactType;

    fn attrs(registry_image: bool) -> StreamAttributes {
        StreamAttributes {
            artifact_type: registry_image.then_some(ArtifactType::Docker),
            ..Default::default()
        }
    }

    fn statuses(
        source_type: SourceType,
        registry_image: bool,
    ) -> (ArtifactStatus, Option<ContentStatus>) {
        let stream = ArtifactStream::new("s1", "acc", source_type, "src");
        initial_statuses(&stream, &attrs(registry_image))
    }

    #[test]
    fn test_status_matrix() {
        use ArtifactStatus::*;
        use ContentStatus::*;

        assert_eq!(statuses(SourceType::Nexus, true), (Approved, Some(MetadataOnly)));
        assert_eq!(statuses(SourceType::Nexus, false), (Approved, Some(NotDownloaded)));
        assert_eq!(
            statuses(SourceType::Artifactory, true),
            (Approved, Some(MetadataOnly))
        );
        assert_eq!(statuses(SourceType::Artifactory, false), (Queued, None));
        assert_eq!(statuses(SourceType::Jenkins, false), (Queued, None));
        assert_eq!(statuses(SourceType::Bamboo, true), (Queued, None));
        for content_free in [
            SourceType::Docker,
            SourceType::Ecr,
            SourceType::AmazonS3,
            SourceType::Custom,
        ] {
            assert_eq!(statuses(content_free, false), (Approved, Some(MetadataOnly)));
        }
    }

    #[test]
    fn test_auto_download_is_content_free() {
        let mut stream = ArtifactStream::new("s1", "acc", SourceType::Jenkins, "job");
        stream.auto_download = true;
        assert!(stream.is_content_free());
        assert_eq!(
            initial_statuses(&stream, &StreamAttributes::default()),
            (ArtifactStatus::Approved, Some(ContentStatus::MetadataOnly))
        );
    }

    #[test]
    fn test_auto_approve_skips_queue() {
        let mut stream = ArtifactStream::new("s1", "acc", SourceType::Jenkins, "job");
        stream.auto_approve = true;
        assert_eq!(
            initial_statuses(&stream, &StreamAttributes::default()),
            (ArtifactStatus::Approved, Some(ContentStatus::NotDownloaded))
        );

        // registry images stay metadata-only
        let mut stream = ArtifactStream::new("s2", "acc", SourceType::Artifactory, "repo");
        stream.auto_approve = true;
        assert_eq!(
            initial_statuses(&stream, &attrs(true)),
            (ArtifactStatus::Approved, Some(ContentStatus::MetadataOnly))
        );
    }

    #[test]
    fn test_metadata_only_flag_wins() {
        let mut stream = ArtifactStream::new("s1", "acc", SourceType::Jenkins, "job");
        stream.metadata_only = true;
        assert_eq!(
            initial_statuses(&stream, &StreamAttributes::default()),
            (ArtifactStatus::Approved, Some(ContentStatus::MetadataOnly))
        );
    }
}
