use crate::source::ArtifactType;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credential/settings object a stream authenticates with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConnection {
    pub id: String,
    pub account_id: String,
    /// Non-secret settings (url, username, region, ...).
    pub value: BTreeMap<String, String>,
    /// Last connectivity failure reported for this connection, if any.
    pub connectivity_error: Option<String>,
}

impl SourceConnection {
    pub fn new(id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityState {
    Healthy,
    Failing(String),
    Missing,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ConnectionStore: Send + Sync {
    fn get(&self, connection_id: &str) -> Result<Option<SourceConnection>>;

    /// Cached connectivity state; blank errors count as healthy.
    fn connectivity(&self, connection_id: &str) -> Result<ConnectivityState> {
        Ok(match self.get(connection_id)? {
            None => ConnectivityState::Missing,
            Some(connection) => match connection.connectivity_error {
                Some(error) if !error.trim().is_empty() => ConnectivityState::Failing(error),
                _ => ConnectivityState::Healthy,
            },
        })
    }
}

/// Opaque handle the worker uses to decrypt a connection's secret fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDetails {
    pub secret_refs: Vec<String>,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SecretManager: Send + Sync {
    fn decrypt(&self, connection: &SourceConnection) -> Result<EncryptedDetails>;

    /// Plain value of a named account secret, `None` when it does not exist.
    fn resolve_secret(&self, account_id: &str, name: &str) -> Result<Option<String>>;
}

/// Service an artifact stream feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundService {
    pub id: String,
    pub artifact_type: Option<ArtifactType>,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ServiceBindings: Send + Sync {
    /// `None` when the service has been deleted.
    fn get_service(&self, service_id: &str) -> Result<Option<BoundService>>;
}
