//! Inbound message handling
//!
//! The orchestrator is the single entry point for messages taken off the
//! receive queue.

pub mod orchestrator;

pub use orchestrator::{HandleOutcome, MessageOrchestrator};
