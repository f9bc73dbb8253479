//! Migration of streams from cron polling to push-based perpetual tasks, and
//! perpetual-task resets when a backing connection changes.

mod eligibility;
mod migrator;
mod reset;

pub use eligibility::{FeatureFlagEligibility, MigrationEligibility};
#[cfg(any(test, feature = "mock"))]
pub use eligibility::MockMigrationEligibility;
pub use migrator::{AttachOutcome, MigrationReport, PollingModeMigrator};
pub use reset::ResetReport;
