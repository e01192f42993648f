//! Testing utilities for Parley nodes.
//!
//! This crate provides reusable flows, flow bundles, a multi-node harness over
//! the in-memory network, an event recorder and transport mocks.

pub mod bundles;
pub mod error;
pub mod events;
pub mod flows;
pub mod mocks;
pub mod network;

/// Re-export commonly used types for convenience
pub use mockall;

pub use error::TestError;
pub use events::{RecordedEvent, RecordingEventHandler};
pub use network::{wait_until, TestNetwork, TestNode};

/// Default time a test waits for something asynchronous to happen
pub const TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Install test logging. Safe to call from every test.
pub fn init_tracing() {
    parley_monitoring::init_test_tracing();
}
