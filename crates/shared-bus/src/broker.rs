//! # Broker Seam
//!
//! Traits over the message broker so publisher and consumer code is written
//! once and runs against either the AMQP broker or the in-memory one.
//!
//! A [`BrokerConnection`] is a long-lived, shared channel factory. A
//! [`BrokerChannel`] is a lightweight, operation-scoped handle: opened for a
//! single publish or a single listen session, then closed.

use crate::error::BusError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of deliveries from a consumed queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BusError>> + Send>>;

/// Properties of a topic exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
}

impl ExchangeSpec {
    /// Durable, not auto-deleted, not internal: meant to outlive broker
    /// restarts and be shared between services.
    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            auto_delete: false,
            internal: false,
        }
    }
}

/// Properties of a consumer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Empty name asks the broker to generate one.
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
}

impl QueueSpec {
    /// Server-named, non-durable, not auto-deleted, exclusive to the
    /// declaring channel.
    pub fn exclusive() -> Self {
        Self {
            name: String::new(),
            durable: false,
            auto_delete: false,
            exclusive: true,
        }
    }
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self::exclusive()
    }
}

/// When a delivery counts as consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// The broker forgets the message as soon as it is delivered.
    #[default]
    Auto,
    /// The consumer acknowledges after the handler succeeds and rejects
    /// (without requeue) when it fails.
    AfterHandler,
}

impl std::str::FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AckMode::Auto),
            "manual" | "after-handler" | "after_handler" => Ok(AckMode::AfterHandler),
            other => Err(format!("unknown ack mode: {}", other)),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Auto => write!(f, "auto"),
            AckMode::AfterHandler => write!(f, "after-handler"),
        }
    }
}

/// Settles a single delivery in [`AckMode::AfterHandler`].
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Mark the delivery as processed.
    async fn ack(&self) -> Result<(), BusError>;

    /// Drop the delivery without requeueing it.
    async fn reject(&self) -> Result<(), BusError>;
}

/// A message handed to a consumer.
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    pub fn new(routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            acker: None,
        }
    }

    #[must_use]
    pub fn with_acker(mut self, acker: Box<dyn Acknowledger>) -> Self {
        self.acker = Some(acker);
        self
    }

    /// The acknowledger, present only for manually acknowledged deliveries.
    pub fn take_acker(&mut self) -> Option<Box<dyn Acknowledger>> {
        self.acker.take()
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("manual_ack", &self.acker.is_some())
            .finish()
    }
}

/// Operation-scoped broker channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a topic exchange. Idempotent for identical properties.
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BusError>;

    /// Publish with `mandatory=false, immediate=false`: unroutable messages
    /// are silently dropped by the broker.
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8])
        -> Result<(), BusError>;

    /// Declare a queue and return its (possibly generated) name.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<String, BusError>;

    /// Bind a queue to an exchange under a routing pattern.
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str)
        -> Result<(), BusError>;

    /// Cap unsettled deliveries per consumer on this channel. Only
    /// [`AckMode::AfterHandler`] consumers are affected; zero means no cap.
    async fn set_prefetch(&self, count: u16) -> Result<(), BusError>;

    /// Start consuming a queue.
    async fn consume(&self, queue: &str, mode: AckMode) -> Result<DeliveryStream, BusError>;

    /// Release the channel.
    async fn close(&self) -> Result<(), BusError>;
}

/// Long-lived, shared broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a fresh channel.
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BusError>;

    /// Whether the underlying connection is still usable.
    fn is_open(&self) -> bool;
}

/// Establishes broker connections. Used by the resilience loop.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> Result<Arc<dyn BrokerConnection>, BusError>;

    /// Where this dialer connects, for logging. Must not contain credentials.
    fn target(&self) -> String;
}
