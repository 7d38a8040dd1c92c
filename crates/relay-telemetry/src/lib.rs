//! # Relay Telemetry
//!
//! Logging and metrics shared by the relay binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::for_service("api-gateway"))?;
//!     // Logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | service binary name | Service name in logs |
//! | `RELAY_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `RELAY_JSON_LOGS` | `false` (`true` in containers) | JSON log output |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, BROKER_DIAL_ATTEMPTS, BUS_HANDLER_FAILURES,
    BUS_MESSAGES_CONSUMED, BUS_MESSAGES_PUBLISHED, GATEWAY_REQUESTS, GATEWAY_REQUEST_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the global subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        let before = BROKER_DIAL_ATTEMPTS.get();
        metric_inc!(BROKER_DIAL_ATTEMPTS);
        metric_inc!(BUS_HANDLER_FAILURES, &["macro-test"]);
        assert!(BROKER_DIAL_ATTEMPTS.get() >= before + 1.0);
        assert!(BUS_HANDLER_FAILURES.with_label_values(&["macro-test"]).get() >= 1.0);
    }
}
