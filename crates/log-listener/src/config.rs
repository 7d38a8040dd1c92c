//! Listener configuration.

use relay_telemetry::parse_flag;
use serde::{Deserialize, Serialize};
use shared_bus::{AckMode, BrokerConfig, DEFAULT_PREFETCH};
use shared_types::Topic;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Main listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Broker connection and retry policy
    pub broker: BrokerConfig,
    /// Binding patterns for the listener's queue
    pub topics: Vec<Topic>,
    /// When deliveries count as consumed
    pub ack_mode: AckMode,
    /// Unsettled deliveries allowed when acking after the handler
    pub prefetch: u16,
    /// Reconnect and re-bind after the broker drops the session
    pub reconnect: bool,
    /// Logger service base URL
    pub logger_url: String,
    /// Logger call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topics: Topic::default_log_topics(),
            ack_mode: AckMode::Auto,
            prefetch: DEFAULT_PREFETCH,
            reconnect: false,
            logger_url: "http://logger".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl ListenerConfig {
    /// Defaults overridden from environment variables.
    ///
    /// - `AMQP_URL`, `AMQP_EXCHANGE`
    /// - `LISTENER_ACK_MODE` (auto | after-handler), `LISTENER_PREFETCH`
    /// - `LISTENER_RECONNECT`
    /// - `LOGGER_SERVICE_URL`, `DOWNSTREAM_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            broker: BrokerConfig::from_env(),
            ..Self::default()
        };

        if let Ok(mode) = env::var("LISTENER_ACK_MODE") {
            config.ack_mode = mode
                .trim()
                .parse()
                .map_err(|e: String| ConfigError::Env(format!("LISTENER_ACK_MODE: {}", e)))?;
        }
        if let Ok(count) = env::var("LISTENER_PREFETCH") {
            config.prefetch = count
                .trim()
                .parse()
                .map_err(|e| ConfigError::Env(format!("LISTENER_PREFETCH: {}", e)))?;
        }
        if let Ok(flag) = env::var("LISTENER_RECONNECT") {
            config.reconnect = parse_flag(&flag);
        }
        if let Ok(url) = env::var("LOGGER_SERVICE_URL") {
            config.logger_url = url;
        }
        if let Ok(ms) = env::var("DOWNSTREAM_TIMEOUT_MS") {
            config.timeout_ms = ms
                .trim()
                .parse()
                .map_err(|e| ConfigError::Env(format!("DOWNSTREAM_TIMEOUT_MS: {}", e)))?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.logger_url.starts_with("http://") || self.logger_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.logger_url.clone()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("timeout_ms cannot be 0".into()));
        }
        if self.topics.is_empty() {
            return Err(ConfigError::Invalid("at least one topic is required".into()));
        }
        self.broker
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid environment variable {0}")]
    Env(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
