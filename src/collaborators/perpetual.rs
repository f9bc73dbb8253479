use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Client registration payload of an artifact-collection perpetual task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpetualTaskParams {
    pub stream_id: String,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PerpetualTaskClient: Send + Sync {
    async fn create(&self, account_id: &str, params: &PerpetualTaskParams) -> Result<String>;

    async fn reset(
        &self,
        account_id: &str,
        task_id: &str,
        params: &PerpetualTaskParams,
    ) -> Result<bool>;

    async fn delete(&self, account_id: &str, task_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    /// Push-based polling owns streams that carry a perpetual task.
    ArtifactPerpetualTask,
    /// Accounts whose streams are migrated to perpetual tasks.
    ArtifactPerpetualTaskMigration,
    /// Streams past the failure threshold are marked stopped.
    ArtifactCollectionConfigurable,
    ExtendedDelegateQueueTimeout,
}

impl FeatureFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFlag::ArtifactPerpetualTask => "ARTIFACT_PERPETUAL_TASK",
            FeatureFlag::ArtifactPerpetualTaskMigration => "ARTIFACT_PERPETUAL_TASK_MIGRATION",
            FeatureFlag::ArtifactCollectionConfigurable => "ARTIFACT_COLLECTION_CONFIGURABLE",
            FeatureFlag::ExtendedDelegateQueueTimeout => "EXTENDED_DELEGATE_QUEUE_TIMEOUT",
        }
    }
}

impl std::fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: FeatureFlag, account_id: &str) -> bool;

    /// Enabled for every account regardless of per-account targeting.
    fn is_globally_enabled(&self, flag: FeatureFlag) -> bool;

    fn accounts_with(&self, flag: FeatureFlag) -> BTreeSet<String>;
}
