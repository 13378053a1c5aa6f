//! Per-message guarantees of the orchestrator

pub mod guarantees_test;
