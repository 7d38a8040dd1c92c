//! Gateway binary.
//!
//! Reads configuration from the environment, connects to the broker only
//! when the `log` action is carried by the queue, then serves HTTP until
//! Ctrl+C.

use anyhow::{Context, Result};
use api_gateway::{Dispatcher, GatewayConfig, GatewayService, LogTransportKind};
use relay_telemetry::{init_telemetry, TelemetryConfig, BROKER_DIAL_ATTEMPTS};
use shared_bus::{connect_with_backoff, BusError, EventPublisher, Publisher};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::for_service("api-gateway"))?;

    let config = GatewayConfig::from_env().context("loading gateway configuration")?;
    config.validate().context("validating gateway configuration")?;
    info!(
        port = config.http.port,
        log_transport = %config.log_transport,
        "Starting api-gateway"
    );

    let publisher = match config.log_transport {
        LogTransportKind::Queue => Some(connect_publisher(&config).await?),
        _ => None,
    };

    let dispatcher = Dispatcher::standard(&config, publisher)?;
    GatewayService::new(config, dispatcher)?
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}

async fn connect_publisher(config: &GatewayConfig) -> Result<Arc<dyn EventPublisher>> {
    let dialer = config.broker.dialer();
    let established = connect_with_backoff(&dialer, &config.broker.retry_policy())
        .await
        .inspect_err(|e| {
            if let BusError::RetriesExhausted { attempts, .. } = e {
                BROKER_DIAL_ATTEMPTS.inc_by(f64::from(*attempts));
            }
        })
        .context("connecting to the message broker")?;
    BROKER_DIAL_ATTEMPTS.inc_by(f64::from(established.attempts));

    let publisher = Publisher::new(established.connection, config.broker.exchange.clone())
        .await
        .context("declaring the log exchange")?;
    Ok(Arc::new(publisher))
}
