//! Test helpers module
//!
//! Test context with in-process bindings plus message and answer builders.

pub mod test_context;
pub mod test_data;

pub use test_context::*;
pub use test_data::*;
