use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Held lock; released on drop.
pub struct LockGuard {
    scope: String,
    _held: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    pub fn new(scope: impl Into<String>, held: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            scope: scope.into(),
            _held: held,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("scope", &self.scope).finish()
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Wait up to `timeout` for exclusive ownership of `scope_key`.
    async fn acquire(&self, scope_key: &str, timeout: Duration) -> Result<LockGuard>;
}

type ScopeMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Drops the entry of `scope_key` once only the map refers to its mutex.
fn prune(scopes: &ScopeMap, scope_key: &str) {
    let mut scopes = scopes.lock().unwrap();
    if scopes
        .get(scope_key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        scopes.remove(scope_key);
    }
}

/// Ownership of one scope; unlocks and prunes on drop.
struct ScopeHold {
    scope: String,
    scopes: ScopeMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ScopeHold {
    fn drop(&mut self) {
        self.guard.take();
        prune(&self.scopes, &self.scope);
    }
}

/// Process-local lock keyed by scope, for single-node deployments.
///
/// Scopes live in the map only while held or waited on.
#[derive(Default)]
pub struct LocalLockManager {
    scopes: ScopeMap,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes currently held or waited on.
    pub fn active_scopes(&self) -> usize {
        self.scopes.lock().unwrap().len()
    }

    fn scope_mutex(&self, scope_key: &str) -> Arc<AsyncMutex<()>> {
        let mut scopes = self.scopes.lock().unwrap();
        scopes
            .entry(scope_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl DistributedLock for LocalLockManager {
    async fn acquire(&self, scope_key: &str, timeout: Duration) -> Result<LockGuard> {
        let mutex = self.scope_mutex(scope_key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                debug!("Acquired lock {}", scope_key);
                let hold = ScopeHold {
                    scope: scope_key.to_string(),
                    scopes: self.scopes.clone(),
                    guard: Some(guard),
                };
                Ok(LockGuard::new(scope_key, Box::new(hold)))
            }
            Err(_) => {
                prune(&self.scopes, scope_key);
                Err(anyhow!(
                    "Timed out after {:?} waiting for lock {}",
                    timeout,
                    scope_key
                ))
            }
        }
    }
}
