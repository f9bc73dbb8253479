use crate::source::{BuildDetails, BuildSourceParameters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPurpose {
    /// Discover new builds.
    Collection,
    /// Fetch the full build list so vanished builds can be pruned.
    Cleanup,
}

impl TaskPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPurpose::Collection => "collection",
            TaskPurpose::Cleanup => "cleanup",
        }
    }
}

/// Opaque unit of work handed to the worker fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub correlation_id: String,
    pub account_id: String,
    pub app_id: String,
    pub stream_id: String,
    pub purpose: TaskPurpose,
    pub parameters: BuildSourceParameters,
    /// How long the task may wait for a worker to pick it up.
    pub queue_timeout_ms: u64,
    /// Enforced by the worker fabric.
    pub execution_timeout_secs: u64,
}

/// What a worker reports back for one correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResponse {
    Success { builds: Vec<BuildDetails> },
    Failure { error: String },
}

impl TaskResponse {
    pub fn success(builds: Vec<BuildDetails>) -> Self {
        TaskResponse::Success { builds }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        TaskResponse::Failure {
            error: error.into(),
        }
    }
}
