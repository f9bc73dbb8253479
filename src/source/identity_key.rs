//! Dedup key selection.
//!
//! The same strategy must be applied to stored artifacts and to freshly
//! fetched builds, otherwise known builds would be collected again.

use super::build_details::BuildDetails;
use super::models::{SourceType, StreamAttributes};
use std::collections::HashSet;

/// Field used to decide whether a build is already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKeyStrategy {
    Revision,
    ArtifactPath,
    BuildNumber,
}

/// The three candidate key fields of a stored artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFields {
    pub revision: Option<String>,
    pub build_no: Option<String>,
    pub artifact_path: Option<String>,
}

impl IdentityKeyStrategy {
    pub fn for_source(source_type: SourceType, attributes: &StreamAttributes) -> Self {
        if source_type == SourceType::Ami {
            IdentityKeyStrategy::Revision
        } else if is_generic_source(source_type, attributes) {
            IdentityKeyStrategy::ArtifactPath
        } else {
            IdentityKeyStrategy::BuildNumber
        }
    }

    pub fn build_key<'a>(&self, build: &'a BuildDetails) -> Option<&'a str> {
        match self {
            IdentityKeyStrategy::Revision => build.revision.as_deref(),
            IdentityKeyStrategy::ArtifactPath => build.resolved_artifact_path(),
            IdentityKeyStrategy::BuildNumber => Some(build.number.as_str()),
        }
    }

    pub fn stored_key<'a>(&self, fields: &'a KeyFields) -> Option<&'a str> {
        match self {
            IdentityKeyStrategy::Revision => fields.revision.as_deref(),
            IdentityKeyStrategy::ArtifactPath => fields.artifact_path.as_deref(),
            IdentityKeyStrategy::BuildNumber => fields.build_no.as_deref(),
        }
    }

    /// Builds whose key is not in `saved_keys`, in fetch order.
    ///
    /// A build without a key value is always considered new.
    pub fn new_build_details(
        &self,
        saved_keys: &HashSet<String>,
        builds: Vec<BuildDetails>,
    ) -> Vec<BuildDetails> {
        if builds.is_empty() || saved_keys.is_empty() {
            return builds;
        }
        builds
            .into_iter()
            .filter(|build| match self.build_key(build) {
                Some(key) => !saved_keys.contains(key),
                None => true,
            })
            .collect()
    }
}

/// Bucket sources and non-docker Artifactory repositories are keyed by path.
fn is_generic_source(source_type: SourceType, attributes: &StreamAttributes) -> bool {
    match source_type {
        SourceType::AmazonS3 | SourceType::Gcs => true,
        SourceType::Artifactory => {
            if attributes.is_registry_image() {
                return false;
            }
            !attributes.repository_kind_is("docker")
        }
        _ => false,
    }
}
