//! What to ask a repository for, and how much.

use super::models::{ArtifactStream, SourceType, StreamAttributes};
use super::script::RenderedScript;
use crate::collaborators::{EncryptedDetails, SourceConnection};
use crate::config::CollectionSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    ListBuilds,
    LastSuccessfulBuild,
}

impl RequestKind {
    /// Listing sources return every build; CI servers only report their newest
    /// successful build. Artifactory lists unless it is a plain maven repository.
    pub fn for_source(source_type: SourceType, attributes: &StreamAttributes) -> Self {
        let lists = match source_type {
            SourceType::Artifactory => {
                attributes.is_registry_image() || !attributes.repository_kind_is("maven")
            }
            other => other.profile().lists_builds,
        };
        if lists {
            RequestKind::ListBuilds
        } else {
            RequestKind::LastSuccessfulBuild
        }
    }
}

/// Result cap. Only Artifactory listings are capped, everything else is unbounded.
pub fn result_limit(
    source_type: SourceType,
    kind: RequestKind,
    is_collection: bool,
    settings: &CollectionSettings,
) -> Option<usize> {
    if source_type == SourceType::Artifactory && kind == RequestKind::ListBuilds {
        Some(if is_collection {
            settings.artifactory_collection_limit
        } else {
            settings.artifactory_manual_pull_limit
        })
    } else {
        None
    }
}

/// Repeated failures periodically force a fresh credential fetch.
pub fn fetch_secret_from_cache(failed_cron_attempts: i64) -> bool {
    failed_cron_attempts < 2 || failed_cron_attempts % 5 != 0
}

/// Everything a repository call needs, for in-process connectors and remote workers alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSourceParameters {
    pub account_id: String,
    pub app_id: String,
    pub stream_id: String,
    pub source_type: SourceType,
    pub attributes: StreamAttributes,
    pub connection: Option<SourceConnection>,
    pub encrypted_details: EncryptedDetails,
    pub request_kind: RequestKind,
    pub limit: Option<usize>,
    pub is_collection: bool,
    pub fetch_secret_from_cache: bool,
    /// Keys already stored, so the worker can drop known builds before replying.
    pub saved_keys: Option<BTreeSet<String>>,
    pub custom_script: Option<RenderedScript>,
}

impl BuildSourceParameters {
    /// Parameters for a connection-backed stream.
    pub fn for_connection(
        stream: &ArtifactStream,
        attributes: &StreamAttributes,
        connection: SourceConnection,
        encrypted_details: EncryptedDetails,
        is_collection: bool,
        settings: &CollectionSettings,
    ) -> Self {
        let request_kind = if is_collection {
            RequestKind::for_source(stream.source_type, attributes)
        } else {
            RequestKind::ListBuilds
        };
        Self {
            account_id: connection.account_id.clone(),
            app_id: stream.app_id.clone(),
            stream_id: stream.id.clone(),
            source_type: stream.source_type,
            attributes: attributes.clone(),
            connection: Some(connection),
            encrypted_details,
            request_kind,
            limit: result_limit(stream.source_type, request_kind, is_collection, settings),
            is_collection,
            fetch_secret_from_cache: fetch_secret_from_cache(stream.failed_cron_attempts),
            saved_keys: None,
            custom_script: None,
        }
    }

    /// Parameters for a custom-script stream; scripts always list.
    pub fn for_script(
        stream: &ArtifactStream,
        script: RenderedScript,
        is_collection: bool,
        settings: &CollectionSettings,
    ) -> Self {
        let request_kind = RequestKind::ListBuilds;
        Self {
            account_id: stream.account_id.clone(),
            app_id: stream.app_id.clone(),
            stream_id: stream.id.clone(),
            source_type: stream.source_type,
            attributes: stream.attributes.clone(),
            connection: None,
            encrypted_details: EncryptedDetails::default(),
            request_kind,
            limit: result_limit(stream.source_type, request_kind, is_collection, settings),
            is_collection,
            fetch_secret_from_cache: true,
            saved_keys: None,
            custom_script: Some(script),
        }
    }

    pub fn with_saved_keys(mut self, keys: BTreeSet<String>) -> Self {
        self.saved_keys = Some(keys);
        self
    }
}
