//! # Event Consumer
//!
//! Consuming side of the event bus.
//!
//! A [`Consumer`] binds an exclusive, server-named queue to the topic
//! exchange under every requested pattern and then streams deliveries. Each
//! delivery is handed to the [`EventHandler`] on its own task, so a slow
//! handler never blocks the stream and completion order between messages is
//! not defined.
//!
//! Bad input never stops the loop: undecodable bodies are logged and
//! skipped, handler errors are logged and discarded.

use crate::broker::{AckMode, BrokerChannel, BrokerConnection, Delivery, DeliveryStream, QueueSpec};
use crate::error::{BusError, HandlerError};
use crate::publisher::declare_exchange;
use async_trait::async_trait;
use futures::StreamExt;
use shared_types::{LogPayload, Topic};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Processes one decoded event.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, payload: LogPayload) -> Result<(), HandlerError>;
}

/// Unsettled deliveries allowed in [`AckMode::AfterHandler`] by default.
pub const DEFAULT_PREFETCH: u16 = 32;

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub ack_mode: AckMode,
    pub queue: QueueSpec,
    /// Cap on in-flight handlers when acking after the handler; 0 for none
    pub prefetch: u16,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::Auto,
            queue: QueueSpec::exclusive(),
            prefetch: DEFAULT_PREFETCH,
        }
    }
}

/// Consumer bound to one topic exchange on a shared connection.
pub struct Consumer {
    connection: Arc<dyn BrokerConnection>,
    exchange: String,
    config: ConsumerConfig,
}

impl Consumer {
    /// Create a consumer, declaring the exchange if it does not exist yet.
    pub async fn new(
        connection: Arc<dyn BrokerConnection>,
        exchange: impl Into<String>,
        config: ConsumerConfig,
    ) -> Result<Self, BusError> {
        let exchange = exchange.into();
        declare_exchange(connection.as_ref(), &exchange).await?;
        Ok(Self {
            connection,
            exchange,
            config,
        })
    }

    /// Declare the queue and bind it under every topic.
    ///
    /// Messages published after this returns are delivered to the
    /// subscription; nothing published before it is.
    pub async fn bind(&self, topics: &[Topic]) -> Result<Subscription, BusError> {
        let channel = self.connection.open_channel().await?;
        match self.bind_on(channel.as_ref(), topics).await {
            Ok((queue, stream)) => Ok(Subscription {
                channel,
                queue,
                stream,
            }),
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    warn!(error = %close_err, "Failed to close consumer channel");
                }
                Err(e)
            }
        }
    }

    async fn bind_on(
        &self,
        channel: &dyn BrokerChannel,
        topics: &[Topic],
    ) -> Result<(String, DeliveryStream), BusError> {
        let queue = channel.declare_queue(&self.config.queue).await?;
        for topic in topics {
            channel
                .bind_queue(&queue, &self.exchange, topic.as_str())
                .await?;
            debug!(queue = %queue, pattern = %topic, "Queue bound");
        }
        if self.config.ack_mode == AckMode::AfterHandler && self.config.prefetch > 0 {
            channel.set_prefetch(self.config.prefetch).await?;
        }
        let stream = channel.consume(&queue, self.config.ack_mode).await?;
        info!(
            queue = %queue,
            exchange = %self.exchange,
            topics = topics.len(),
            ack_mode = %self.config.ack_mode,
            "Listening for events"
        );
        Ok((queue, stream))
    }

    /// Bind and run until the subscription fails.
    pub async fn listen(
        &self,
        topics: &[Topic],
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BusError> {
        self.bind(topics).await?.run(handler).await
    }
}

/// A bound queue with an active delivery stream.
pub struct Subscription {
    channel: Box<dyn BrokerChannel>,
    queue: String,
    stream: DeliveryStream,
}

impl Subscription {
    /// Broker-generated queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    /// Next raw delivery, `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<Delivery, BusError>> {
        self.stream.next().await
    }

    /// Dispatch every delivery to `handler` on its own task.
    ///
    /// Only returns on a broker-side failure; the stream ending is reported
    /// as [`BusError::ConsumerCancelled`].
    #[instrument(skip_all, fields(queue = %self.queue))]
    pub async fn run(mut self, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        let error = loop {
            match self.stream.next().await {
                Some(Ok(delivery)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(process(handler, delivery));
                }
                Some(Err(e)) => break e,
                None => break BusError::ConsumerCancelled,
            }
        };

        warn!(error = %error, "Subscription ended");
        self.close().await;
        Err(error)
    }

    /// Release the channel, dropping an exclusive queue with it.
    pub async fn close(self) {
        if let Err(e) = self.channel.close().await {
            warn!(queue = %self.queue, error = %e, "Failed to close consumer channel");
        }
    }
}

async fn process(handler: Arc<dyn EventHandler>, mut delivery: Delivery) {
    let acker = delivery.take_acker();

    let result = match serde_json::from_slice::<LogPayload>(&delivery.body) {
        Ok(payload) => {
            let title = payload.title.clone();
            handler.handle(payload).await.map_err(|e| {
                warn!(
                    routing_key = %delivery.routing_key,
                    title = %title,
                    error = %e,
                    "Event handler failed"
                );
            })
        }
        Err(e) => {
            warn!(
                routing_key = %delivery.routing_key,
                error = %e,
                "Skipping undecodable event"
            );
            Err(())
        }
    };

    if let Some(acker) = acker {
        let settled = match result {
            Ok(()) => acker.ack().await,
            Err(()) => acker.reject().await,
        };
        if let Err(e) = settled {
            warn!(routing_key = %delivery.routing_key, error = %e, "Failed to settle delivery");
        }
    }
}
