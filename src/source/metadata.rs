//! Type-specific mapping of build details into artifact metadata.

use super::build_details::BuildDetails;
use super::models::{ArtifactStream, DisplayNameSource, MetadataMapping};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub mod keys {
    pub const BUILD_NO: &str = "buildNo";
    pub const ARTIFACT_PATH: &str = "artifactPath";
    pub const ARTIFACT_FILE_NAME: &str = "artifactFileName";
    pub const ARTIFACT_FILE_SIZE: &str = "artifactFileSize";
    pub const URL: &str = "url";
    pub const BUCKET_NAME: &str = "bucketName";
    pub const KEY: &str = "key";
    pub const BUILD_FULL_DISPLAY_NAME: &str = "buildFullDisplayName";
}

fn put(metadata: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        metadata.insert(key.to_string(), value.to_string());
    }
}

fn put_non_empty(metadata: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    put(metadata, key, value.filter(|v| !v.is_empty()));
}

/// Metadata map for an artifact created from `build`.
///
/// Starts from the build's own metadata; absent optional fields are simply
/// not written.
pub fn artifact_metadata(stream: &ArtifactStream, build: &BuildDetails) -> BTreeMap<String, String> {
    let mut metadata = build.metadata.clone();

    match stream.profile().metadata_mapping {
        MetadataMapping::RegistryWithPath => {
            if let Some(path) = build.resolved_artifact_path() {
                put(&mut metadata, keys::ARTIFACT_PATH, Some(path));
                put(
                    &mut metadata,
                    keys::ARTIFACT_FILE_NAME,
                    Some(build.file_name_from_number()),
                );
                put(
                    &mut metadata,
                    keys::ARTIFACT_FILE_SIZE,
                    build.artifact_file_size.as_deref(),
                );
            }
            put_non_empty(&mut metadata, keys::URL, build.build_url.as_deref());
            put(&mut metadata, keys::BUILD_NO, Some(&build.number));
        }
        MetadataMapping::Bucket => {
            let params = &build.build_parameters;
            let param = |key: &str| params.get(key).map(String::as_str);
            put(&mut metadata, keys::ARTIFACT_PATH, build.resolved_artifact_path());
            put(
                &mut metadata,
                keys::ARTIFACT_FILE_NAME,
                Some(build.file_name_from_number()),
            );
            put(&mut metadata, keys::BUILD_NO, param(keys::BUILD_NO));
            put(&mut metadata, keys::BUCKET_NAME, param(keys::BUCKET_NAME));
            put(&mut metadata, keys::KEY, param(keys::KEY));
            put(&mut metadata, keys::URL, param(keys::URL));
            put(
                &mut metadata,
                keys::ARTIFACT_FILE_SIZE,
                param(keys::ARTIFACT_FILE_SIZE),
            );
        }
        MetadataMapping::CiServer | MetadataMapping::FileShare => {
            metadata.extend(build.build_parameters.clone());
            put(&mut metadata, keys::BUILD_NO, Some(&build.number));
            put(
                &mut metadata,
                keys::BUILD_FULL_DISPLAY_NAME,
                build.build_full_display_name.as_deref(),
            );
            put(&mut metadata, keys::URL, build.build_url.as_deref());
        }
        MetadataMapping::Grouped => {
            put(&mut metadata, keys::BUILD_NO, Some(&build.number));
            put_non_empty(&mut metadata, keys::URL, build.build_url.as_deref());
            if let Some(first) = build.file_metadata.first() {
                put(&mut metadata, keys::ARTIFACT_FILE_NAME, Some(&first.file_name));
            }
        }
        MetadataMapping::BuildNumberOnly => {
            put(&mut metadata, keys::BUILD_NO, Some(&build.number));
        }
    }

    metadata
}

/// Display name: the build's own, else the stream template filled per type.
pub fn artifact_display_name(
    stream: &ArtifactStream,
    build: &BuildDetails,
    at: DateTime<Utc>,
) -> String {
    if let Some(name) = build.build_display_name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match (stream.profile().display_name, build.artifact_path.as_deref()) {
        (DisplayNameSource::PathIfPresent, Some(path)) => stream.artifact_display_name(path, at),
        (DisplayNameSource::PathOrEmpty, path) => {
            stream.artifact_display_name(path.unwrap_or(""), at)
        }
        _ => stream.artifact_display_name(&build.number, at),
    }
}
