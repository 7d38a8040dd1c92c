//! # Shared Bus - Topic Exchange Event Bus
//!
//! Durable publish and fan-out of log-style events between processes.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   push(payload, topic)   ┌───────────────────┐
//! │  Publisher   │ ───────────────────────► │  topic exchange   │
//! └──────────────┘                          │   (logs_topic)    │
//!                                           └─────────┬─────────┘
//!                          binding patterns           │
//!               ┌─────────────────────────────────────┼──────────────┐
//!               ▼                                     ▼              ▼
//!        ┌────────────┐                        ┌────────────┐  ┌────────────┐
//!        │ queue A    │  log.INFO, log.WARN    │ queue B    │  │ queue C    │  log.#
//!        └─────┬──────┘                        └─────┬──────┘  └─────┬──────┘
//!              ▼                                     ▼               ▼
//!        Consumer ──spawn per message──► EventHandler::handle
//! ```
//!
//! ## Connection Ownership
//!
//! A single [`BrokerConnection`] is established once per process by the
//! resilience loop ([`resilience::connect_with_backoff`]) and passed to the
//! [`Publisher`] and [`Consumer`] constructors. Both open their own
//! short-lived channel per operation and never mutate the connection.
//!
//! ## Delivery Guarantees
//!
//! - Publishing is **at-most-once**: a successful `push` means the broker
//!   accepted the message for routing, not that anyone received it.
//! - Queues carry no history: a consumer only sees messages published after
//!   its bindings exist.
//! - In [`AckMode::Auto`] a message is consumed at delivery time; a handler
//!   failure loses it. [`AckMode::AfterHandler`] acknowledges only once the
//!   handler returns successfully.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod amqp;
pub mod broker;
pub mod config;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod resilience;
pub mod subscriber;
pub mod topic;

// Re-export main types
pub use amqp::{AmqpConnection, AmqpDialer};
pub use broker::{
    AckMode, Acknowledger, BrokerChannel, BrokerConnection, Delivery, DeliveryStream, Dialer,
    ExchangeSpec, QueueSpec,
};
pub use config::{BrokerConfig, ConfigError};
pub use error::{BusError, HandlerError};
pub use memory::InMemoryBroker;
pub use publisher::{EventPublisher, Publisher};
pub use resilience::{connect_with_backoff, ConnectionState, Established, RetryPolicy};
pub use subscriber::{Consumer, ConsumerConfig, EventHandler, Subscription, DEFAULT_PREFETCH};
pub use topic::matches;

pub use shared_types::{LogPayload, Topic, DEFAULT_LOG_TOPICS, LOG_EXCHANGE};

/// Content type attached to every published message.
pub const CONTENT_TYPE: &str = "text/plain";
