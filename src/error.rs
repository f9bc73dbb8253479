//! Error types surfaced by the collection entry points.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    /// The stream's bound service disappeared while the stream still existed.
    /// The stream has already been deleted when this is returned.
    #[error("Artifact stream {stream_id} is orphaned: its owning service was deleted")]
    StreamOrphaned { stream_id: String },

    /// A last-successful-build comparison met a build number that is not an integer.
    #[error("Build number '{value}' of stream {stream_id} is not numeric")]
    NonNumericBuildNumber { stream_id: String, value: String },

    #[error("Invalid connection {connection_id} referenced by artifact stream")]
    InvalidConnection { connection_id: String },

    #[error("Invalid custom script: {0}")]
    InvalidScript(String),

    #[error("Could not acquire collection lock for {scope}")]
    LockUnavailable { scope: String },

    #[error("Source connector error: {0}")]
    Connector(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
