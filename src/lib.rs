//! Billy
//!
//! A conversational financial assistant backend. Chat messages arrive on a
//! queue, run through a persisted step dialogue under a per-sender lock and
//! an hourly token budget, and replies are published back to the gateway.

#![allow(non_snake_case)]

pub mod config;
pub mod database;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod steps;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{BillyError, Result};

// Re-export main components for easy access
pub use handlers::{HandleOutcome, MessageOrchestrator};
pub use state::{StateStorage, StepEngine, StepRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
