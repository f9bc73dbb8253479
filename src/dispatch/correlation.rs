use super::descriptor::TaskPurpose;
use crate::source::StreamAttributes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Local record of a submitted task awaiting its response.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub correlation_id: String,
    pub account_id: String,
    pub stream_id: String,
    pub purpose: TaskPurpose,
    /// Attributes the task was built with; the response is keyed the same way.
    pub attributes: StreamAttributes,
    pub registered_at: Instant,
}

/// Result of [`CorrelationRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// The correlation id is already pending; the existing entry is untouched.
    DuplicateId,
    /// The stream already has a pending task of the same purpose.
    StreamBusy { correlation_id: String },
}

/// Pending tasks by correlation id. Each entry can be taken once, which is
/// what makes completion handling at-most-once.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<String, PendingTask>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// At most one pending task per (stream, purpose).
    pub fn register(&self, task: PendingTask) -> Registration {
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(&task.correlation_id) {
            return Registration::DuplicateId;
        }
        if let Some(existing) = pending
            .values()
            .find(|other| other.stream_id == task.stream_id && other.purpose == task.purpose)
        {
            return Registration::StreamBusy {
                correlation_id: existing.correlation_id.clone(),
            };
        }
        pending.insert(task.correlation_id.clone(), task);
        Registration::Registered
    }

    /// Correlation id of the pending `purpose` task of a stream, if any.
    pub fn pending_for(&self, stream_id: &str, purpose: TaskPurpose) -> Option<String> {
        self.pending
            .lock()
            .unwrap()
            .values()
            .find(|task| task.stream_id == stream_id && task.purpose == purpose)
            .map(|task| task.correlation_id.clone())
    }

    pub fn take(&self, correlation_id: &str) -> Option<PendingTask> {
        self.pending.lock().unwrap().remove(correlation_id)
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
