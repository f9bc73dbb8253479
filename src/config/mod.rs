mod file_config;

pub use file_config::{CollectionConfig, DispatchConfig, FileConfig, JobsConfig, MigrationConfig};

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// SQLite file backing streams and artifacts.
    pub db_path: Option<PathBuf>,

    pub collection: CollectionSettings,
    pub dispatch: DispatchSettings,
    pub migration: MigrationSettings,
    pub jobs: JobsSettings,
}

impl CollectorConfig {
    /// Resolve configuration from defaults overlaid by an optional TOML file config.
    pub fn resolve(file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let defaults = CollectionSettings::default();
        let c = file.collection.unwrap_or_default();
        let collection = CollectionSettings {
            retention_size: c.retention_size.unwrap_or(defaults.retention_size),
            lock_timeout_secs: c.lock_timeout_secs.unwrap_or(defaults.lock_timeout_secs),
            max_failed_attempts: c
                .max_failed_attempts
                .unwrap_or(defaults.max_failed_attempts),
            artifactory_collection_limit: c
                .artifactory_collection_limit
                .unwrap_or(defaults.artifactory_collection_limit),
            artifactory_manual_pull_limit: c
                .artifactory_manual_pull_limit
                .unwrap_or(defaults.artifactory_manual_pull_limit),
        };

        let defaults = DispatchSettings::default();
        let d = file.dispatch.unwrap_or_default();
        let dispatch = DispatchSettings {
            queue_timeout_ms: d.queue_timeout_ms.unwrap_or(defaults.queue_timeout_ms),
            extended_queue_timeout_ms: d
                .extended_queue_timeout_ms
                .unwrap_or(defaults.extended_queue_timeout_ms),
            on_prem_queue_timeout_ms: d
                .on_prem_queue_timeout_ms
                .unwrap_or(defaults.on_prem_queue_timeout_ms),
            on_prem: d.on_prem.unwrap_or(defaults.on_prem),
            execution_timeout_secs: d
                .execution_timeout_secs
                .unwrap_or(defaults.execution_timeout_secs),
            custom_script_timeout_secs: d
                .custom_script_timeout_secs
                .unwrap_or(defaults.custom_script_timeout_secs),
            completion_timeout_secs: d
                .completion_timeout_secs
                .unwrap_or(defaults.completion_timeout_secs),
        };

        let defaults = MigrationSettings::default();
        let m = file.migration.unwrap_or_default();
        let migration = MigrationSettings {
            interval_secs: m.interval_secs.unwrap_or(defaults.interval_secs),
            batch_size: m.batch_size.unwrap_or(defaults.batch_size),
        };

        let defaults = JobsSettings::default();
        let j = file.jobs.unwrap_or_default();
        let jobs = JobsSettings {
            collection_interval_secs: j
                .collection_interval_secs
                .unwrap_or(defaults.collection_interval_secs),
            cleanup_interval_secs: j
                .cleanup_interval_secs
                .unwrap_or(defaults.cleanup_interval_secs),
            stream_page_size: j.stream_page_size.unwrap_or(defaults.stream_page_size),
        };

        if collection.retention_size == 0 {
            bail!("collection.retention_size must be greater than zero");
        }
        if migration.batch_size == 0 || jobs.stream_page_size == 0 {
            bail!("Batch sizes must be greater than zero");
        }
        if migration.interval_secs == 0
            || jobs.collection_interval_secs == 0
            || jobs.cleanup_interval_secs == 0
        {
            bail!("Job intervals must be greater than zero");
        }

        Ok(Self {
            db_path: file.db_path.map(PathBuf::from),
            collection,
            dispatch,
            migration,
            jobs,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::resolve(Some(FileConfig::load(path)?))
    }
}

#[derive(Debug, Clone)]
pub struct CollectionSettings {
    /// Downloaded artifacts kept per stream by retention GC.
    pub retention_size: usize,
    pub lock_timeout_secs: u64,
    /// Cron collection stops once a stream fails more often than this.
    pub max_failed_attempts: i64,
    pub artifactory_collection_limit: usize,
    pub artifactory_manual_pull_limit: usize,
}

impl CollectionSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            retention_size: 25,
            lock_timeout_secs: 600,
            max_failed_attempts: 3500,
            artifactory_collection_limit: 25,
            artifactory_manual_pull_limit: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub queue_timeout_ms: u64,
    pub extended_queue_timeout_ms: u64,
    pub on_prem_queue_timeout_ms: u64,
    pub on_prem: bool,
    /// Worker-side timeout of direct-credential repository calls.
    pub execution_timeout_secs: u64,
    /// Used when a custom script does not declare its own timeout.
    pub custom_script_timeout_secs: u64,
    /// Local wait for a worker response before the correlation is expired.
    pub completion_timeout_secs: u64,
}

impl DispatchSettings {
    pub fn queue_timeout(&self, extended: bool) -> Duration {
        let ms = if self.on_prem {
            self.on_prem_queue_timeout_ms
        } else if extended {
            self.extended_queue_timeout_ms
        } else {
            self.queue_timeout_ms
        };
        Duration::from_millis(ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_timeout_ms: 6_000,
            extended_queue_timeout_ms: 15_000,
            on_prem_queue_timeout_ms: 45_000,
            on_prem: false,
            execution_timeout_secs: 30,
            custom_script_timeout_secs: 60,
            completion_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub interval_secs: u64,
    /// Streams migrated per pass.
    pub batch_size: usize,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub collection_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub stream_page_size: usize,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            collection_interval_secs: 60,
            cleanup_interval_secs: 7200,
            stream_page_size: 100,
        }
    }
}
