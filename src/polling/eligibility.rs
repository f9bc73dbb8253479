use crate::collaborators::{FeatureFlag, FeatureFlags};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which accounts take part in the perpetual-task migration.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait MigrationEligibility: Send + Sync {
    fn is_eligible(&self, account_id: &str) -> bool;

    /// `None` when every account is eligible.
    fn eligible_accounts(&self) -> Option<BTreeSet<String>>;
}

/// Accounts opted into both the migration and the perpetual-task feature,
/// or everyone once the migration is enabled globally.
pub struct FeatureFlagEligibility {
    flags: Arc<dyn FeatureFlags>,
}

impl FeatureFlagEligibility {
    pub fn new(flags: Arc<dyn FeatureFlags>) -> Self {
        Self { flags }
    }

    fn globally_enabled(&self) -> bool {
        self.flags
            .is_globally_enabled(FeatureFlag::ArtifactPerpetualTaskMigration)
    }
}

impl MigrationEligibility for FeatureFlagEligibility {
    fn is_eligible(&self, account_id: &str) -> bool {
        self.globally_enabled()
            || (self
                .flags
                .is_enabled(FeatureFlag::ArtifactPerpetualTaskMigration, account_id)
                && self
                    .flags
                    .is_enabled(FeatureFlag::ArtifactPerpetualTask, account_id))
    }

    fn eligible_accounts(&self) -> Option<BTreeSet<String>> {
        if self.globally_enabled() {
            return None;
        }
        let migrating = self
            .flags
            .accounts_with(FeatureFlag::ArtifactPerpetualTaskMigration);
        let perpetual = self.flags.accounts_with(FeatureFlag::ArtifactPerpetualTask);
        Some(migrating.intersection(&perpetual).cloned().collect())
    }
}
