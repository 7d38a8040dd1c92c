//! Listener binary: consume log events until Ctrl+C.

use anyhow::{Context, Result};
use log_listener::{ListenerConfig, ListenerRuntime, TitleRouter};
use relay_telemetry::{init_telemetry, TelemetryConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::for_service("log-listener"))?;

    let config = ListenerConfig::from_env().context("loading listener configuration")?;
    config.validate().context("validating listener configuration")?;
    info!(
        topics = ?config.topics,
        ack_mode = %config.ack_mode,
        reconnect = config.reconnect,
        "Starting log-listener"
    );

    let handler = TitleRouter::standard(&config.logger_url, config.timeout())?;
    let dialer = Arc::new(config.broker.dialer());
    let runtime = Arc::new(ListenerRuntime::new(config, dialer, Arc::new(handler)));

    let signal_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_runtime.shutdown(),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    runtime.run().await.context("consuming log events")?;
    info!("log-listener stopped");
    Ok(())
}
