//! Resolution shared by the synchronous and delegated collection paths.

use crate::collaborators::{ConnectionStore, SecretManager, ServiceBindings};
use crate::config::CollectionSettings;
use crate::error::{CollectionError, CollectionResult};
use crate::lifecycle::LifecycleManager;
use crate::source::{
    render_custom_script, ArtifactStream, BuildSourceParameters, IdentityKeyStrategy,
    StreamAttributes,
};
use crate::store::ArtifactStore;
use std::collections::BTreeSet;
use tracing::error;

/// Stream attributes with the bound service's artifact type applied.
///
/// A stream whose service no longer exists is purged and reported as orphaned.
pub async fn bound_attributes(
    stream: &ArtifactStream,
    services: &dyn ServiceBindings,
    lifecycle: &LifecycleManager,
) -> CollectionResult<StreamAttributes> {
    let mut attributes = stream.attributes.clone();
    let Some(service_id) = stream.service_id.as_deref() else {
        return Ok(attributes);
    };

    match services.get_service(service_id)? {
        Some(service) => {
            if service.artifact_type.is_some() {
                attributes.artifact_type = service.artifact_type;
            }
            Ok(attributes)
        }
        None => {
            error!(
                "Artifact stream {} is bound to deleted service {}, deleting stream",
                stream.id, service_id
            );
            lifecycle.purge_stream(&stream.id).await?;
            Err(CollectionError::StreamOrphaned {
                stream_id: stream.id.clone(),
            })
        }
    }
}

/// Everything needed to resolve a stream into repository call parameters.
pub struct ParameterResolver<'a> {
    pub connections: &'a dyn ConnectionStore,
    pub secrets: &'a dyn SecretManager,
    pub settings: &'a CollectionSettings,
    pub custom_script_timeout_secs: u64,
}

impl ParameterResolver<'_> {
    /// `None` when a connection-backed stream's connection is gone.
    pub fn resolve(
        &self,
        stream: &ArtifactStream,
        attributes: &StreamAttributes,
        is_collection: bool,
    ) -> CollectionResult<Option<BuildSourceParameters>> {
        if stream.source_type.is_custom() {
            let script =
                render_custom_script(stream, self.secrets, self.custom_script_timeout_secs)?;
            return Ok(Some(BuildSourceParameters::for_script(
                stream,
                script,
                is_collection,
                self.settings,
            )));
        }

        let Some(connection_id) = stream.connection_id.as_deref() else {
            return Ok(None);
        };
        let Some(connection) = self.connections.get(connection_id)? else {
            return Ok(None);
        };
        let encrypted = self.secrets.decrypt(&connection)?;
        Ok(Some(BuildSourceParameters::for_connection(
            stream,
            attributes,
            connection,
            encrypted,
            is_collection,
            self.settings,
        )))
    }
}

/// Dedup keys of everything already stored for the stream.
pub fn saved_keys<S: ArtifactStore + ?Sized>(
    store: &S,
    stream_id: &str,
    strategy: IdentityKeyStrategy,
) -> CollectionResult<BTreeSet<String>> {
    Ok(store
        .existing_key_projections(stream_id)?
        .iter()
        .filter_map(|fields| strategy.stored_key(fields).map(String::from))
        .collect())
}
