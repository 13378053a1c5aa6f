//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from configuration files and environment variables.
//! Every section has defaults, so a bare environment only needs the values
//! that differ (usually `BILLY__BOT__PHONE_NUMBER` and the service URLs).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::errors::{BillyError, Result};

const ENV_PREFIX: &str = "BILLY";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub bot: BotConfig,
    pub transport: TransportConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ai: AiConfig,
    pub rate_limit: RateLimitSettings,
    pub background: BackgroundConfig,
    pub logging: LoggingConfig,
}

/// Assistant identity and per-message behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// The assistant's own number; messages from it are ignored
    pub phone_number: String,
    pub lock_ttl_seconds: u64,
    pub failure_message: String,
}

/// Message queue names and polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    pub receive_queue: String,
    pub send_queue: String,
    pub poll_timeout_seconds: u64,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
    pub state_ttl_seconds: u64,
}

/// Interpretation service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_retries: u32,
    pub request_timeout_seconds: u64,
}

/// Token budget window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    pub window_seconds: u64,
    pub default_tokens_per_window: u64,
}

/// Background task execution limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundConfig {
    pub max_concurrent_tasks: usize,
    pub shutdown_grace_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub json: bool,
}

impl Settings {
    /// Load settings from the optional `config` file and environment variables
    pub fn new() -> Result<Self> {
        Self::load(config::File::with_name("config").required(false))
    }

    /// Load settings from an explicit file, still honouring environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BillyError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        Self::load(config::File::from(path))
    }

    fn load<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = config::Config::try_from(&Settings::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        super::validation::validate_settings(self)
    }
}

impl BotConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

impl TransportConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }
}

impl RedisConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_seconds)
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl BackgroundConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                phone_number: String::new(),
                lock_ttl_seconds: 30,
                failure_message: "Something went wrong while processing your message.".to_string(),
            },
            transport: TransportConfig {
                receive_queue: "q.message.receive".to_string(),
                send_queue: "q.message.send".to_string(),
                poll_timeout_seconds: 5,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/billy".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: String::new(),
                state_ttl_seconds: 3600,
            },
            ai: AiConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                api_key: String::new(),
                model: "gemini-1.5-flash".to_string(),
                request_retries: 3,
                request_timeout_seconds: 10,
            },
            rate_limit: RateLimitSettings {
                window_seconds: 3600,
                default_tokens_per_window: 5000,
            },
            background: BackgroundConfig {
                max_concurrent_tasks: 5,
                shutdown_grace_seconds: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                json: false,
            },
        }
    }
}
