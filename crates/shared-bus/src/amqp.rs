//! # AMQP Broker
//!
//! [`BrokerConnection`] and [`Dialer`] over a real AMQP 0-9-1 broker via
//! `lapin`.

use crate::broker::{
    AckMode, Acknowledger, BrokerChannel, BrokerConnection, Delivery, DeliveryStream, Dialer,
    ExchangeSpec, QueueSpec,
};
use crate::error::BusError;
use crate::CONTENT_TYPE;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tracing::debug;

/// Dials an AMQP broker at a fixed URI.
#[derive(Clone)]
pub struct AmqpDialer {
    uri: String,
}

impl AmqpDialer {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl std::fmt::Debug for AmqpDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpDialer")
            .field("target", &redact_credentials(&self.uri))
            .finish()
    }
}

#[async_trait]
impl Dialer for AmqpDialer {
    async fn dial(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Dial(e.to_string()))?;
        Ok(Arc::new(AmqpConnection { inner: connection }))
    }

    fn target(&self) -> String {
        redact_credentials(&self.uri)
    }
}

/// Drop the `user:password@` part of a broker URI.
pub(crate) fn redact_credentials(uri: &str) -> String {
    match uri.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://{}", scheme, host),
            None => uri.to_string(),
        },
        None => uri.to_string(),
    }
}

/// An established AMQP connection.
pub struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BusError> {
        if !self.is_open() {
            return Err(BusError::ConnectionClosed);
        }
        let channel = self
            .inner
            .create_channel()
            .await
            .map_err(|e| BusError::Channel(e.to_string()))?;
        Ok(Box::new(AmqpChannel { inner: channel }))
    }

    fn is_open(&self) -> bool {
        self.inner.status().connected()
    }
}

struct AmqpChannel {
    inner: Channel,
}

/// RabbitMQ reports mismatched re-declarations as a 406 channel close.
fn declare_error(err: lapin::Error) -> BusError {
    let message = err.to_string();
    if message.contains("PRECONDITION_FAILED") {
        BusError::PreconditionFailed(message)
    } else {
        BusError::Declare(message)
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BusError> {
        let options = ExchangeDeclareOptions {
            passive: false,
            durable: spec.durable,
            auto_delete: spec.auto_delete,
            internal: spec.internal,
            nowait: false,
        };
        self.inner
            .exchange_declare(&spec.name, ExchangeKind::Topic, options, FieldTable::default())
            .await
            .map_err(declare_error)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BusError> {
        let options = BasicPublishOptions {
            mandatory: false,
            immediate: false,
        };
        let properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());
        self.inner
            .basic_publish(exchange, routing_key, options, body, properties)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<String, BusError> {
        let options = QueueDeclareOptions {
            passive: false,
            durable: spec.durable,
            exclusive: spec.exclusive,
            auto_delete: spec.auto_delete,
            nowait: false,
        };
        let queue = self
            .inner
            .queue_declare(&spec.name, options, FieldTable::default())
            .await
            .map_err(declare_error)?;
        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BusError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Bind(e.to_string()))
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BusError> {
        self.inner
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Consume(e.to_string()))
    }

    async fn consume(&self, queue: &str, mode: AckMode) -> Result<DeliveryStream, BusError> {
        let options = BasicConsumeOptions {
            no_ack: mode == AckMode::Auto,
            ..BasicConsumeOptions::default()
        };
        let consumer = self
            .inner
            .basic_consume(queue, "", options, FieldTable::default())
            .await
            .map_err(|e| BusError::Consume(e.to_string()))?;
        debug!(queue, ack_mode = %mode, "AMQP consumer started");

        let stream = consumer.map(move |item| {
            let delivery = item.map_err(|e| BusError::Consume(e.to_string()))?;
            let converted = Delivery::new(delivery.routing_key.as_str(), delivery.data);
            Ok(match mode {
                AckMode::Auto => converted,
                AckMode::AfterHandler => converted.with_acker(Box::new(AmqpAcker {
                    inner: delivery.acker,
                })),
            })
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<(), BusError> {
        if !self.inner.status().connected() {
            return Ok(());
        }
        self.inner
            .close(200, "OK")
            .await
            .map_err(|e| BusError::Channel(e.to_string()))
    }
}

struct AmqpAcker {
    inner: Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BusError> {
        self.inner
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }

    async fn reject(&self) -> Result<(), BusError> {
        self.inner
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}
