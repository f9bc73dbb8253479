//! Synchronous build collection and the resolution it shares with the
//! delegated path.

mod connector;
mod params;
mod service;

pub use connector::SourceConnector;
#[cfg(any(test, feature = "mock"))]
pub use connector::MockSourceConnector;
pub use params::{bound_attributes, saved_keys, ParameterResolver};
pub use service::Collector;
