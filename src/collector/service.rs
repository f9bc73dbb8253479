use super::connector::SourceConnector;
use super::params::{bound_attributes, saved_keys, ParameterResolver};
use crate::collaborators::Collaborators;
use crate::config::CollectorConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::lifecycle::LifecycleManager;
use crate::source::{
    ArtifactStream, BuildDetails, IdentityKeyStrategy, KeyFields, RequestKind,
};
use crate::store::{Artifact, ArtifactStore, CollectionStore, StreamStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Synchronous collection: list remote builds, keep the unknown ones, create artifacts.
pub struct Collector {
    store: Arc<dyn CollectionStore>,
    collaborators: Collaborators,
    connector: Arc<dyn SourceConnector>,
    lifecycle: Arc<LifecycleManager>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(
        store: Arc<dyn CollectionStore>,
        collaborators: Collaborators,
        connector: Arc<dyn SourceConnector>,
        lifecycle: Arc<LifecycleManager>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            store,
            collaborators,
            connector,
            lifecycle,
            config,
        }
    }

    /// Collect new builds of `stream_id`.
    ///
    /// A stream deleted concurrently yields an empty result. A stream whose
    /// service is gone is deleted and reported as orphaned.
    pub async fn collect_new(&self, stream_id: &str) -> CollectionResult<Vec<Artifact>> {
        let Some(stream) = self.store.get_stream(stream_id)? else {
            debug!("Artifact stream {} no longer exists", stream_id);
            return Ok(Vec::new());
        };

        let attributes = bound_attributes(
            &stream,
            self.collaborators.services.as_ref(),
            &self.lifecycle,
        )
        .await?;

        let resolver = ParameterResolver {
            connections: self.collaborators.connections.as_ref(),
            secrets: self.collaborators.secrets.as_ref(),
            settings: &self.config.collection,
            custom_script_timeout_secs: self.config.dispatch.custom_script_timeout_secs,
        };
        let Some(params) = resolver.resolve(&stream, &attributes, true)? else {
            return Err(CollectionError::InvalidConnection {
                connection_id: stream.connection_id.clone().unwrap_or_default(),
            });
        };

        let strategy = IdentityKeyStrategy::for_source(stream.source_type, &attributes);
        let new_builds = match params.request_kind {
            RequestKind::ListBuilds => {
                let keys = saved_keys(self.store.as_ref(), &stream.id, strategy)?;
                let params = params.with_saved_keys(keys.clone());
                let Some(builds) = self.fetch(&params).await? else {
                    return Ok(Vec::new());
                };
                let known: HashSet<String> = keys.into_iter().collect();
                strategy.new_build_details(&known, builds)
            }
            RequestKind::LastSuccessfulBuild => {
                let Some(builds) = self.fetch(&params).await? else {
                    return Ok(Vec::new());
                };
                self.newer_than_stored(&stream, builds)?
            }
        };

        if new_builds.is_empty() {
            debug!("No new builds for artifact stream {}", stream.id);
            return Ok(Vec::new());
        }
        info!(
            "Found {} new builds for artifact stream {}",
            new_builds.len(),
            stream.id
        );
        let created = self
            .lifecycle
            .create_artifacts(&stream, &attributes, new_builds)
            .await?;
        Ok(created)
    }

    async fn fetch(
        &self,
        params: &crate::source::BuildSourceParameters,
    ) -> CollectionResult<Option<Vec<BuildDetails>>> {
        self.connector
            .fetch_builds(params)
            .await
            .map_err(|e| CollectionError::Connector(format!("{:#}", e)))
    }

    /// The newest successful build, if its number exceeds every stored one.
    fn newer_than_stored(
        &self,
        stream: &ArtifactStream,
        builds: Vec<BuildDetails>,
    ) -> CollectionResult<Vec<BuildDetails>> {
        let Some(latest) = builds.into_iter().next() else {
            return Ok(Vec::new());
        };
        let latest_no = parse_build_number(stream, &latest.number)?;

        let stored = self.store.existing_key_projections(&stream.id)?;
        let mut stored_max: Option<i64> = None;
        for KeyFields { build_no, .. } in &stored {
            if let Some(build_no) = build_no {
                let n = parse_build_number(stream, build_no)?;
                stored_max = Some(stored_max.map_or(n, |max| max.max(n)));
            }
        }

        match stored_max {
            Some(max) if latest_no <= max => Ok(Vec::new()),
            _ => Ok(vec![latest]),
        }
    }
}

fn parse_build_number(stream: &ArtifactStream, value: &str) -> CollectionResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| CollectionError::NonNumericBuildNumber {
            stream_id: stream.id.clone(),
            value: value.to_string(),
        })
}
