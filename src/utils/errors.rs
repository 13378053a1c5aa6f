//! Error handling for Billy
//!
//! This module defines the main error type used throughout the application
//! and provides a unified error handling strategy.

use thiserror::Error;

use crate::state::step::StepFailure;

/// Main error type for the Billy application
#[derive(Error, Debug)]
pub enum BillyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Interpretation error: {0}")]
    Interpretation(String),

    #[error("Step already registered: {0}")]
    DuplicateStep(String),

    #[error("Step failed: {0}")]
    Step(#[from] StepFailure),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Result type alias for Billy operations
pub type Result<T> = std::result::Result<T, BillyError>;

impl From<config::ConfigError> for BillyError {
    fn from(err: config::ConfigError) -> Self {
        BillyError::Config(err.to_string())
    }
}

impl BillyError {
    /// Transient failures are worth retrying against remote services
    pub fn is_transient(&self) -> bool {
        match self {
            BillyError::Http(err) => err.is_connect() || err.is_timeout(),
            BillyError::ServiceUnavailable(_) => true,
            _ => false,
        }
    }
}
