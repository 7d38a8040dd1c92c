//! # Event Publisher
//!
//! Publishing side of the event bus.
//!
//! Delivery is **at-most-once**: a successful [`EventPublisher::push`] only
//! means the broker accepted the message for routing. No publisher confirm
//! is awaited and unroutable messages are dropped by the broker.

use crate::broker::{BrokerConnection, ExchangeSpec};
use crate::error::BusError;
use async_trait::async_trait;
use shared_types::Topic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an opaque payload under a routing key.
    async fn push(&self, payload: &str, topic: &Topic) -> Result<(), BusError>;

    /// Total messages the broker has accepted from this publisher.
    fn events_published(&self) -> u64;
}

/// Publisher bound to one topic exchange on a shared connection.
///
/// Safe for concurrent use: every push opens its own channel.
pub struct Publisher {
    connection: Arc<dyn BrokerConnection>,
    exchange: String,
    events_published: AtomicU64,
}

impl Publisher {
    /// Create a publisher, declaring the exchange once.
    ///
    /// The declaration is idempotent, so any number of publishers (and
    /// consumers) may be constructed against the same exchange name.
    pub async fn new(
        connection: Arc<dyn BrokerConnection>,
        exchange: impl Into<String>,
    ) -> Result<Self, BusError> {
        let exchange = exchange.into();
        declare_exchange(connection.as_ref(), &exchange).await?;
        debug!(exchange = %exchange, "Publisher ready");

        Ok(Self {
            connection,
            exchange,
            events_published: AtomicU64::new(0),
        })
    }

    /// Name of the exchange this publisher writes to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

/// Declare the process-wide topic exchange on a throwaway channel.
pub(crate) async fn declare_exchange(
    connection: &dyn BrokerConnection,
    exchange: &str,
) -> Result<(), BusError> {
    let channel = connection.open_channel().await?;
    let result = channel.declare_exchange(&ExchangeSpec::topic(exchange)).await;
    if let Err(e) = channel.close().await {
        warn!(error = %e, "Failed to close declare channel");
    }
    result
}

#[async_trait]
impl EventPublisher for Publisher {
    async fn push(&self, payload: &str, topic: &Topic) -> Result<(), BusError> {
        let channel = self.connection.open_channel().await?;
        let result = channel
            .publish(&self.exchange, topic.as_str(), payload.as_bytes())
            .await;

        if let Err(e) = channel.close().await {
            warn!(error = %e, "Failed to close publish channel");
        }
        result?;

        self.events_published.fetch_add(1, Ordering::Relaxed);
        debug!(
            exchange = %self.exchange,
            topic = %topic,
            bytes = payload.len(),
            "Event pushed"
        );
        Ok(())
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{AckMode, QueueSpec};
    use crate::memory::InMemoryBroker;
    use futures::StreamExt;
    use shared_types::{Severity, LOG_EXCHANGE};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_construct_twice_declares_once() {
        let broker = InMemoryBroker::new();
        let conn: Arc<dyn BrokerConnection> = Arc::new(broker.clone());

        let first = Publisher::new(Arc::clone(&conn), LOG_EXCHANGE).await;
        let second = Publisher::new(conn, LOG_EXCHANGE).await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(broker.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_push_without_consumers_succeeds() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker), LOG_EXCHANGE)
            .await
            .unwrap();

        publisher
            .push(r#"{"title":"a","content":"b"}"#, &Topic::log(Severity::Info))
            .await
            .unwrap();

        assert_eq!(publisher.events_published(), 1);
    }

    #[tokio::test]
    async fn test_push_reaches_bound_queue() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), LOG_EXCHANGE)
            .await
            .unwrap();

        let channel = broker.open_channel().await.unwrap();
        let queue = channel.declare_queue(&QueueSpec::exclusive()).await.unwrap();
        channel.bind_queue(&queue, LOG_EXCHANGE, "log.*").await.unwrap();
        let mut stream = channel.consume(&queue, AckMode::Auto).await.unwrap();

        publisher.push("hello", &Topic::log(Severity::Warn)).await.unwrap();

        let delivery = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("delivery in time")
            .unwrap()
            .unwrap();
        assert_eq!(delivery.routing_key, "log.WARN");
        assert_eq!(delivery.body, b"hello");
    }

    #[tokio::test]
    async fn test_push_on_closed_connection_fails() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), LOG_EXCHANGE)
            .await
            .unwrap();

        broker.shutdown();
        let result = publisher.push("x", &Topic::log(Severity::Info)).await;

        assert_eq!(result, Err(BusError::ConnectionClosed));
        assert_eq!(publisher.events_published(), 0);
    }
}
