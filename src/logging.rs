//! Tracing subscriber setup for hosts embedding the collector.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Install a fmt subscriber filtered by `LOG_LEVEL`, falling back to `default_level`.
///
/// Returns false when a global subscriber was already installed, which is
/// the normal case when the host process configured logging itself.
pub fn init_logging(default_level: LevelFilter) -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var(LOG_LEVEL_ENV)
                .from_env_lossy(),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LevelFilter::DEBUG);
        assert!(!init_logging(LevelFilter::INFO));
    }
}
