//! Listener lifecycle: connect, bind, consume, and optionally start over
//! when the broker drops the session.

use crate::config::ListenerConfig;
use relay_telemetry::BROKER_DIAL_ATTEMPTS;
use shared_bus::{
    connect_with_backoff, BusError, Consumer, ConsumerConfig, Dialer, Established, EventHandler,
    QueueSpec, RetryPolicy,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Runs one consumer session at a time until shutdown.
pub struct ListenerRuntime {
    config: ListenerConfig,
    dialer: Arc<dyn Dialer>,
    handler: Arc<dyn EventHandler>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl ListenerRuntime {
    pub fn new(
        config: ListenerConfig,
        dialer: Arc<dyn Dialer>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            dialer,
            handler,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Ask [`ListenerRuntime::run`] to return.
    pub fn shutdown(&self) {
        info!("Initiating listener shutdown");
        self.shutdown_tx.send_replace(true);
    }

    /// Consume until shutdown.
    ///
    /// Without `reconnect` the first session failure is returned. With it,
    /// the runtime backs off, dials again and re-binds. Running out of dial
    /// attempts or a topology conflict ends the loop.
    #[instrument(skip_all, fields(exchange = %self.config.broker.exchange))]
    pub async fn run(&self) -> Result<(), BusError> {
        let mut shutdown = self.shutdown_rx.clone();
        let policy = self.config.broker.retry_policy();
        let mut sessions: u64 = 0;
        // Sessions that ended before their queue was bound again
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                return Ok(());
            }

            let established = tokio::select! {
                result = self.connect(&policy) => result?,
                _ = shutdown.changed() => {
                    info!("Shutdown signal received while connecting");
                    return Ok(());
                }
            };
            sessions += 1;

            let session = tokio::select! {
                result = self.session(established, &mut failures) => result,
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            };

            let error = match session {
                Ok(()) => return Ok(()),
                Err(e) if !self.config.reconnect => return Err(e),
                Err(e) if !e.is_recoverable() => {
                    error!(error = %e, sessions, "Listen session failed, not reconnecting");
                    return Err(e);
                }
                Err(e) => e,
            };

            failures += 1;
            let delay = policy.backoff(failures);
            warn!(
                error = %error,
                sessions,
                failures,
                delay_ms = delay.as_millis() as u64,
                "Listen session ended, reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown signal received while backing off");
                    return Ok(());
                }
            }
        }
    }

    async fn connect(&self, policy: &RetryPolicy) -> Result<Established, BusError> {
        let result = connect_with_backoff(self.dialer.as_ref(), policy).await;
        let attempts = match &result {
            Ok(established) => established.attempts,
            Err(BusError::RetriesExhausted { attempts, .. }) => *attempts,
            Err(_) => 0,
        };
        BROKER_DIAL_ATTEMPTS.inc_by(f64::from(attempts));
        result
    }

    /// Bind, then consume. `failures` resets once the queue is bound.
    async fn session(&self, established: Established, failures: &mut u32) -> Result<(), BusError> {
        let consumer = Consumer::new(
            established.connection,
            self.config.broker.exchange.clone(),
            ConsumerConfig {
                ack_mode: self.config.ack_mode,
                queue: QueueSpec::exclusive(),
                prefetch: self.config.prefetch,
            },
        )
        .await?;
        let subscription = consumer.bind(&self.config.topics).await?;
        *failures = 0;
        subscription.run(Arc::clone(&self.handler)).await
    }
}
