//! This module provides reusable test utilities:
//! - Mock compute HTTP API (wiremock)
//! - Fake compute with a live notification channel (axum)
//! - Recording collaborators (notification bus, persistence, images)
//! - Test configuration builders
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_compute;
pub mod recording;
pub mod test_config;
pub mod test_data;

// Re-export commonly used items
pub use fake_compute::FakeCompute;
pub use mock_compute::MockComputeServer;
pub use recording::{RecordingBus, RecordingPersistence, StaticImages, TestHarness};
pub use test_config::TestConfigBuilder;
pub use test_data::*;
