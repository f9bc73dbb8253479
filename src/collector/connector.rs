use crate::source::{BuildDetails, BuildSourceParameters};
use anyhow::Result;
use async_trait::async_trait;

/// In-process access to an external repository.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Current builds of the source described by `params`.
    ///
    /// `None` means the listing is fully delegated and results will arrive
    /// through a worker completion instead.
    async fn fetch_builds(&self, params: &BuildSourceParameters)
        -> Result<Option<Vec<BuildDetails>>>;
}
