//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the Billy application.

use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::utils::errors::{BillyError, Result};

/// Initialize logging based on configuration.
///
/// `RUST_LOG` wins over the configured level when set. The returned guard
/// flushes the file appender and must live as long as the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BillyError::Config(format!("Invalid log filter: {}", e)))?;

    let (file_writer, guard) = match &config.file_path {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "billy.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let json_stdout = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stdout));
    let plain_stdout = (!config.json).then(|| fmt::layer().with_writer(std::io::stdout));
    let file_layer = file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_stdout)
        .with(plain_stdout)
        .with(file_layer)
        .try_init()
        .map_err(|e| BillyError::Config(format!("Failed to initialize logging: {}", e)))?;

    info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(guard)
}

/// Log a step being executed for a message
pub fn log_step_execution(transaction_id: &str, step: &str, kind: &str) {
    debug!(
        transaction_id = transaction_id,
        step = step,
        kind = kind,
        "Executing step"
    );
}

/// Log a sender hitting the token budget
pub fn log_rate_limit_exceeded(sender: &str, used: u64, budget: u64, wait_seconds: u64) {
    warn!(
        sender = sender,
        used = used,
        budget = budget,
        wait_seconds = wait_seconds,
        "Token budget exhausted"
    );
}

/// Log the end of processing for one inbound message
pub fn log_message_processed(transaction_id: &str, outcome: &str, tokens_used: u64, duration_ms: u64) {
    info!(
        transaction_id = transaction_id,
        outcome = outcome,
        tokens_used = tokens_used,
        duration_ms = duration_ms,
        "Message processed"
    );
}

/// Log API errors with context
pub fn log_api_error(api: &str, error: &str, context: Option<&str>) {
    error!(
        api = api,
        error = error,
        context = context,
        "API error occurred"
    );
}
