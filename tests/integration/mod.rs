//! Integration tests module
//!
//! End-to-end dialogues through the orchestrator, organized by scenario.

pub mod orchestrator;
pub mod scenarios;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging for tests (called once)
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("Billy=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Common setup function for integration tests
pub fn setup_integration_test() -> crate::helpers::TestContext {
    init_test_logging();
    crate::helpers::TestContext::new()
}
