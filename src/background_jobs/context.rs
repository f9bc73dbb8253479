use crate::store::CollectionStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Streams and artifacts.
    pub store: Arc<dyn CollectionStore>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, store: Arc<dyn CollectionStore>) -> Self {
        Self {
            cancellation_token,
            store,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Same resources with a token that is cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            store: Arc::clone(&self.store),
        }
    }
}
