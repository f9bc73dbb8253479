//! Shared infrastructure for the integration tests
//!
//! Every test gets its own on-disk database and a fresh set of in-memory
//! collaborators, so tests can run in parallel.

#![allow(dead_code)]

pub mod constants;
pub mod fakes;
pub mod harness;

pub use constants::*;
pub use fakes::*;
pub use harness::TestCollector;
