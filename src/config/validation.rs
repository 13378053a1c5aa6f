//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use super::Settings;
use crate::utils::errors::{BillyError, Result};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    validate_transport_config(&settings.transport)?;
    validate_database_config(&settings.database)?;
    validate_redis_config(&settings.redis)?;
    validate_ai_config(&settings.ai)?;
    validate_rate_limit_config(&settings.rate_limit)?;
    validate_background_config(&settings.background)?;
    validate_logging_config(&settings.logging)?;
    validate_lock_covers_interpretation(&settings.bot, &settings.ai)?;

    Ok(())
}

/// Validate bot configuration
fn validate_bot_config(config: &super::BotConfig) -> Result<()> {
    if config.phone_number.is_empty() {
        return Err(BillyError::Config(
            "Bot phone number is required".to_string(),
        ));
    }

    if config.lock_ttl_seconds == 0 {
        return Err(BillyError::Config(
            "Lock TTL must be greater than 0".to_string(),
        ));
    }

    if config.failure_message.trim().is_empty() {
        return Err(BillyError::Config(
            "Failure message cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// The sender lock must outlive one interpretation call with all its retries,
/// or a second message could start while the first is still waiting
fn validate_lock_covers_interpretation(bot: &super::BotConfig, ai: &super::AiConfig) -> Result<()> {
    let worst_case = u64::from(ai.request_retries).saturating_mul(ai.request_timeout_seconds);
    if bot.lock_ttl_seconds < worst_case {
        return Err(BillyError::Config(format!(
            "Lock TTL ({}s) must cover {} AI attempts of {}s each ({}s)",
            bot.lock_ttl_seconds, ai.request_retries, ai.request_timeout_seconds, worst_case
        )));
    }

    Ok(())
}

/// Validate transport configuration
fn validate_transport_config(config: &super::TransportConfig) -> Result<()> {
    if config.receive_queue.is_empty() || config.send_queue.is_empty() {
        return Err(BillyError::Config(
            "Receive and send queue names are required".to_string(),
        ));
    }

    if config.receive_queue == config.send_queue {
        return Err(BillyError::Config(
            "Receive and send queues must differ".to_string(),
        ));
    }

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(BillyError::Config(
            "Database URL is required".to_string(),
        ));
    }

    if config.max_connections == 0 {
        return Err(BillyError::Config(
            "Max connections must be greater than 0".to_string(),
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(BillyError::Config(
            "Min connections cannot be greater than max connections".to_string(),
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(BillyError::Config(
            "Redis URL is required".to_string(),
        ));
    }

    url::Url::parse(&config.url)?;

    if config.state_ttl_seconds == 0 {
        return Err(BillyError::Config(
            "State TTL must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate interpretation service configuration
fn validate_ai_config(config: &super::AiConfig) -> Result<()> {
    let base = url::Url::parse(&config.base_url)?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(BillyError::Config(format!(
            "AI base URL must be http(s), got {}",
            base.scheme()
        )));
    }

    if config.model.is_empty() {
        return Err(BillyError::Config("AI model is required".to_string()));
    }

    if config.request_retries == 0 {
        return Err(BillyError::Config(
            "AI request retries must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validate token budget configuration
fn validate_rate_limit_config(config: &super::RateLimitSettings) -> Result<()> {
    if config.window_seconds == 0 {
        return Err(BillyError::Config(
            "Rate limit window must be greater than 0".to_string(),
        ));
    }

    if config.default_tokens_per_window == 0 {
        return Err(BillyError::Config(
            "Default token budget must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate background task configuration
fn validate_background_config(config: &super::BackgroundConfig) -> Result<()> {
    if config.max_concurrent_tasks == 0 {
        return Err(BillyError::Config(
            "Max concurrent background tasks must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(BillyError::Config(
            "Log level is required".to_string(),
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(BillyError::Config(format!(
            "Invalid log level: {}. Valid levels: {:?}",
            config.level, valid_levels
        )));
    }

    Ok(())
}
