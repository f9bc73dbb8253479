//! Artifact stream configuration and the per-source-type strategy table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of external repository a stream polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Docker,
    Ecr,
    Gcr,
    Acr,
    Nexus,
    Ami,
    AmazonS3,
    Gcs,
    Smb,
    Sftp,
    AzureArtifacts,
    AzureMachineImage,
    Artifactory,
    Jenkins,
    Bamboo,
    Custom,
}

/// How build details are folded into `Artifact.metadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMapping {
    /// Path, file name, size, url and build number (Artifactory-like).
    RegistryWithPath,
    /// Everything read from the build parameter bag (S3/GCS-like).
    Bucket,
    /// Parameter bag plus build number, full display name and url.
    CiServer,
    /// Parameter bag plus build number, path, display name and url.
    FileShare,
    /// Build number, url and the first file's name (Nexus-like).
    Grouped,
    BuildNumberOnly,
}

/// Which value fills the display-name template when the build has no display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayNameSource {
    BuildNumber,
    /// Artifact path when present, build number otherwise.
    PathIfPresent,
    /// Artifact path, or an empty placeholder.
    PathOrEmpty,
}

/// Static per-type behaviour.
#[derive(Debug, Clone, Copy)]
pub struct SourceProfile {
    /// Repository can enumerate every available build.
    pub lists_builds: bool,
    /// Builds never carry downloadable binary content.
    pub content_free: bool,
    pub supports_cleanup: bool,
    pub metadata_mapping: MetadataMapping,
    pub display_name: DisplayNameSource,
}

const fn profile(
    lists_builds: bool,
    content_free: bool,
    supports_cleanup: bool,
    metadata_mapping: MetadataMapping,
    display_name: DisplayNameSource,
) -> SourceProfile {
    SourceProfile {
        lists_builds,
        content_free,
        supports_cleanup,
        metadata_mapping,
        display_name,
    }
}

impl SourceType {
    pub const ALL: [SourceType; 16] = [
        SourceType::Docker,
        SourceType::Ecr,
        SourceType::Gcr,
        SourceType::Acr,
        SourceType::Nexus,
        SourceType::Ami,
        SourceType::AmazonS3,
        SourceType::Gcs,
        SourceType::Smb,
        SourceType::Sftp,
        SourceType::AzureArtifacts,
        SourceType::AzureMachineImage,
        SourceType::Artifactory,
        SourceType::Jenkins,
        SourceType::Bamboo,
        SourceType::Custom,
    ];

    pub fn profile(&self) -> SourceProfile {
        use DisplayNameSource::*;
        use MetadataMapping::*;
        match self {
            SourceType::Docker | SourceType::Ecr | SourceType::Gcr | SourceType::Acr => {
                profile(true, true, true, BuildNumberOnly, BuildNumber)
            }
            SourceType::Nexus => profile(true, false, true, Grouped, BuildNumber),
            SourceType::Ami => profile(true, true, true, BuildNumberOnly, BuildNumber),
            SourceType::AmazonS3 => profile(true, true, false, Bucket, PathOrEmpty),
            SourceType::Gcs => profile(true, true, false, Bucket, BuildNumber),
            SourceType::Smb | SourceType::Sftp => {
                profile(true, true, false, FileShare, BuildNumber)
            }
            SourceType::AzureArtifacts => profile(true, true, false, BuildNumberOnly, BuildNumber),
            SourceType::AzureMachineImage => {
                profile(true, true, true, BuildNumberOnly, BuildNumber)
            }
            SourceType::Artifactory => {
                profile(false, false, true, RegistryWithPath, PathIfPresent)
            }
            SourceType::Jenkins | SourceType::Bamboo => {
                profile(false, false, false, CiServer, BuildNumber)
            }
            SourceType::Custom => profile(true, true, true, BuildNumberOnly, BuildNumber),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Docker => "DOCKER",
            SourceType::Ecr => "ECR",
            SourceType::Gcr => "GCR",
            SourceType::Acr => "ACR",
            SourceType::Nexus => "NEXUS",
            SourceType::Ami => "AMI",
            SourceType::AmazonS3 => "AMAZON_S3",
            SourceType::Gcs => "GCS",
            SourceType::Smb => "SMB",
            SourceType::Sftp => "SFTP",
            SourceType::AzureArtifacts => "AZURE_ARTIFACTS",
            SourceType::AzureMachineImage => "AZURE_MACHINE_IMAGE",
            SourceType::Artifactory => "ARTIFACTORY",
            SourceType::Jenkins => "JENKINS",
            SourceType::Bamboo => "BAMBOO",
            SourceType::Custom => "CUSTOM",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, SourceType::Custom)
    }
}

/// Artifact type of the service a stream is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    Docker,
    Jar,
    War,
    Zip,
    Tar,
    Rpm,
    Other,
}

/// Hints used to resolve the registry-vs-generic ambiguity of some repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAttributes {
    /// Repository layout as reported by the repository ("docker", "maven", "generic", ...).
    pub repository_kind: Option<String>,
    pub artifact_type: Option<ArtifactType>,
    /// Repository-specific locator (image name, job name, bucket, ...).
    pub locator: Option<String>,
}

impl StreamAttributes {
    pub fn is_registry_image(&self) -> bool {
        self.artifact_type == Some(ArtifactType::Docker)
    }

    pub fn repository_kind_is(&self, kind: &str) -> bool {
        self.repository_kind.as_deref() == Some(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptAction {
    FetchVersions,
}

/// Where to find builds inside a custom script's JSON output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub artifact_root: String,
    pub build_no_path: String,
    /// Relative path in each entry -> metadata key.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomScript {
    pub action: Option<ScriptAction>,
    pub script: String,
    /// Timeout expression in seconds, may contain template variables.
    pub timeout: Option<String>,
    pub mapping: Option<AttributeMapping>,
}

/// Custom-script configuration of a `CUSTOM` stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSourceConfig {
    pub scripts: Vec<CustomScript>,
    pub template_variables: BTreeMap<String, String>,
}

/// Health of a stream's cron collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    #[default]
    Unstable,
    Stable,
    Stopped,
}

impl CollectionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CollectionStatus::Unstable => "UNSTABLE",
            CollectionStatus::Stable => "STABLE",
            CollectionStatus::Stopped => "STOPPED",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "STABLE" => CollectionStatus::Stable,
            "STOPPED" => CollectionStatus::Stopped,
            _ => CollectionStatus::Unstable,
        }
    }
}

/// One configured external artifact source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStream {
    pub id: String,
    pub account_id: String,
    pub app_id: String,
    /// Service the stream feeds. `None` for connector-level streams.
    pub service_id: Option<String>,
    pub name: String,
    /// Name copied onto every artifact collected from this stream.
    pub source_name: String,
    pub source_type: SourceType,
    /// Credential/settings reference. Custom-script streams have none.
    pub connection_id: Option<String>,
    pub attributes: StreamAttributes,
    pub custom: Option<CustomSourceConfig>,
    /// Template-driven streams only resolvable at deployment time.
    pub parameterized: bool,
    pub metadata_only: bool,
    pub auto_download: bool,
    /// Content-bearing artifacts skip the approval queue and wait for an
    /// on-demand download.
    pub auto_approve: bool,
    pub failed_cron_attempts: i64,
    pub perpetual_task_id: Option<String>,
    pub collection_status: CollectionStatus,
    pub last_iteration: Option<i64>,
    pub last_successful_iteration: Option<i64>,
    pub created_at: i64,
}

impl ArtifactStream {
    /// Minimal stream of the given type; remaining fields take neutral defaults.
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        source_type: SourceType,
        source_name: impl Into<String>,
    ) -> Self {
        let source_name = source_name.into();
        Self {
            id: id.into(),
            account_id: account_id.into(),
            app_id: String::new(),
            service_id: None,
            name: source_name.clone(),
            source_name,
            source_type,
            connection_id: None,
            attributes: StreamAttributes::default(),
            custom: None,
            parameterized: false,
            metadata_only: false,
            auto_download: false,
            auto_approve: false,
            failed_cron_attempts: 0,
            perpetual_task_id: None,
            collection_status: CollectionStatus::default(),
            last_iteration: None,
            last_successful_iteration: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn profile(&self) -> SourceProfile {
        self.source_type.profile()
    }

    /// Artifacts of this stream never need a content download.
    ///
    /// Auto-downloaded streams deliver content through the source itself.
    pub fn is_content_free(&self) -> bool {
        self.metadata_only || self.auto_download || self.profile().content_free
    }

    pub fn has_perpetual_task(&self) -> bool {
        self.perpetual_task_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }

    /// Canonical artifact display name: `<source>_<value>_<timestamp>`.
    pub fn artifact_display_name(&self, value: &str, at: chrono::DateTime<chrono::Utc>) -> String {
        format!(
            "{}_{}_{}",
            self.source_name,
            value,
            at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
