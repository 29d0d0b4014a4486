//! Shared test utilities for discern integration tests.
//!
//! This module provides:
//! - `MockBackend` and `RecordingCache`, scripted stand-ins for the remote service
//! - Builders for content items, cache records and orchestrators

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{MockBackend, RecordingCache};
