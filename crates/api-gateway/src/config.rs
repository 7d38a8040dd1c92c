//! Gateway configuration with validation.
//!
//! Defaults match the container deployment: downstream services are reached
//! by their compose service names. Every address can be overridden from the
//! environment through [`GatewayConfig::from_env`].

use serde::{Deserialize, Serialize};
use shared_bus::BrokerConfig;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Downstream service addresses and timeouts
    pub downstream: DownstreamConfig,
    /// Transport used for the `log` action
    pub log_transport: LogTransportKind,
    /// Broker connection, used only by the queue transport
    pub broker: BrokerConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Request limits
    pub limits: LimitsConfig,
}

impl GatewayConfig {
    /// Defaults overridden from environment variables.
    ///
    /// - `GATEWAY_HTTP_PORT`
    /// - `AUTH_SERVICE_URL`, `LOGGER_SERVICE_URL`, `MAILER_SERVICE_URL`
    /// - `LOGGER_GRPC_URL`, `LOGGER_RPC_ADDR`
    /// - `LOG_TRANSPORT` (rest | grpc | rpc | queue)
    /// - `DOWNSTREAM_TIMEOUT_MS`, `GRPC_TIMEOUT_MS`
    /// - `AMQP_URL`, `AMQP_EXCHANGE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            broker: BrokerConfig::from_env(),
            ..Self::default()
        };

        if let Some(port) = env_parse::<u16>("GATEWAY_HTTP_PORT")? {
            config.http.port = port;
        }
        if let Ok(url) = env::var("AUTH_SERVICE_URL") {
            config.downstream.auth_url = url;
        }
        if let Ok(url) = env::var("LOGGER_SERVICE_URL") {
            config.downstream.logger_url = url;
        }
        if let Ok(url) = env::var("MAILER_SERVICE_URL") {
            config.downstream.mailer_url = url;
        }
        if let Ok(url) = env::var("LOGGER_GRPC_URL") {
            config.downstream.logger_grpc_url = url;
        }
        if let Ok(addr) = env::var("LOGGER_RPC_ADDR") {
            config.downstream.logger_rpc_addr = addr;
        }
        if let Some(kind) = env_parse::<LogTransportKind>("LOG_TRANSPORT")? {
            config.log_transport = kind;
        }
        if let Some(ms) = env_parse::<u64>("DOWNSTREAM_TIMEOUT_MS")? {
            config.downstream.timeout_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("GRPC_TIMEOUT_MS")? {
            config.downstream.grpc_timeout_ms = ms;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("auth_url", &self.downstream.auth_url),
            ("logger_url", &self.downstream.logger_url),
            ("mailer_url", &self.downstream.mailer_url),
            ("logger_grpc_url", &self.downstream.logger_grpc_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(format!("{}: {}", name, url)));
            }
        }

        if self.downstream.logger_rpc_addr.is_empty() {
            return Err(ConfigError::Invalid("logger_rpc_addr cannot be empty".into()));
        }

        if self.downstream.timeout_ms == 0 || self.downstream.grpc_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "downstream timeouts cannot be 0".into(),
            ));
        }

        if self.limits.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_body_bytes cannot be 0".into(),
            ));
        }

        if self.log_transport == LogTransportKind::Queue {
            self.broker
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 80)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 80,
        }
    }
}

/// Downstream service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Authentication service base URL
    pub auth_url: String,
    /// Logger service base URL (REST)
    pub logger_url: String,
    /// Mailer service base URL
    pub mailer_url: String,
    /// Logger gRPC endpoint
    pub logger_grpc_url: String,
    /// Logger legacy RPC `host:port`
    pub logger_rpc_addr: String,
    /// REST and RPC call timeout in milliseconds
    pub timeout_ms: u64,
    /// gRPC call deadline in milliseconds
    pub grpc_timeout_ms: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            auth_url: "http://authentication".to_string(),
            logger_url: "http://logger".to_string(),
            mailer_url: "http://mailer".to_string(),
            logger_grpc_url: "http://logger:50001".to_string(),
            logger_rpc_addr: "logger:5001".to_string(),
            timeout_ms: 10_000,
            grpc_timeout_ms: 2_000,
        }
    }
}

impl DownstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grpc_timeout(&self) -> Duration {
        Duration::from_millis(self.grpc_timeout_ms)
    }
}

/// Which transport carries the `log` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTransportKind {
    /// HTTP POST to the logger service
    Rest,
    /// gRPC `WriteLog`
    Grpc,
    /// Legacy RPC `LogInfo`
    #[default]
    Rpc,
    /// Publish to the log exchange
    Queue,
}

impl FromStr for LogTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" | "http" => Ok(Self::Rest),
            "grpc" => Ok(Self::Grpc),
            "rpc" => Ok(Self::Rpc),
            "queue" | "amqp" => Ok(Self::Queue),
            other => Err(format!("unknown log transport: {}", other)),
        }
    }
}

impl fmt::Display for LogTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rest => "rest",
            Self::Grpc => "grpc",
            Self::Rpc => "rpc",
            Self::Queue => "queue",
        };
        f.write_str(name)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; a trailing `*` matches any suffix
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed request headers
    pub allowed_headers: Vec<String>,
    /// Headers exposed to the browser
    pub expose_headers: Vec<String>,
    /// Allow credentials
    pub allow_credentials: bool,
    /// Preflight cache in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["https://*".to_string(), "http://*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Accept", "Authorization", "Content-Type", "X-CSRF-Token"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            expose_headers: vec!["Link".to_string()],
            allow_credentials: true,
            max_age: 300,
        }
    }
}

/// Request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1_048_576,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Malformed downstream URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Environment variable could not be parsed
    #[error("invalid environment variable {0}")]
    Env(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
