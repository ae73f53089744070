//! Common test data and constants

use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Generate a random project ID for testing
pub fn random_project_id() -> String {
    Uuid::new_v4().to_string()
}

/// Poll `check` until it holds, failing the test after two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never reached: {}", what);
}

/// Common compute identifiers
pub mod computes {
    pub const COMPUTE_1: &str = "test-compute-1";
    pub const COMPUTE_2: &str = "test-compute-2";
}

/// Common notification frames
pub mod frames {
    pub const PING: &str =
        r#"{"action":"ping","event":{"cpu_usage_percent":12,"memory_usage_percent":34}}"#;
    pub const NODE_CREATED: &str = r#"{"action":"node.created","event":{"id":"x"}}"#;
}
