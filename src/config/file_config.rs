use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,

    pub collection: Option<CollectionConfig>,
    pub dispatch: Option<DispatchConfig>,
    pub migration: Option<MigrationConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CollectionConfig {
    pub retention_size: Option<usize>,
    pub lock_timeout_secs: Option<u64>,
    pub max_failed_attempts: Option<i64>,
    pub artifactory_collection_limit: Option<usize>,
    pub artifactory_manual_pull_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue_timeout_ms: Option<u64>,
    pub extended_queue_timeout_ms: Option<u64>,
    pub on_prem_queue_timeout_ms: Option<u64>,
    pub on_prem: Option<bool>,
    pub execution_timeout_secs: Option<u64>,
    pub custom_script_timeout_secs: Option<u64>,
    pub completion_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MigrationConfig {
    pub interval_secs: Option<u64>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub collection_interval_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub stream_page_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
