//! Artifact sources: stream configuration, discovered builds and the
//! per-type rules applied to them (dedup key, metadata mapping, request kind,
//! custom script rendering).

mod build_details;
mod identity_key;
pub mod metadata;
mod models;
mod request;
mod script;

pub use build_details::{BuildDetails, FileMetadata};
pub use identity_key::{IdentityKeyStrategy, KeyFields};
pub use metadata::{artifact_display_name, artifact_metadata};
pub use models::{
    ArtifactStream, ArtifactType, AttributeMapping, CollectionStatus, CustomScript,
    CustomSourceConfig, DisplayNameSource, MetadataMapping, ScriptAction, SourceProfile,
    SourceType, StreamAttributes,
};
pub use request::{fetch_secret_from_cache, result_limit, BuildSourceParameters, RequestKind};
pub use script::{render_custom_script, RenderedScript};
