//! Shared identifiers used by the fixtures

pub const ACCOUNT_ID: &str = "account-1";
pub const APP_ID: &str = "app-1";
pub const CONNECTION_ID: &str = "conn-1";
pub const SERVICE_ID: &str = "service-1";
