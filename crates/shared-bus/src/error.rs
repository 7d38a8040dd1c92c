//! # Bus Errors

use thiserror::Error;

/// Errors from broker, publisher and consumer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Dialing the broker failed.
    #[error("broker dial failed: {0}")]
    Dial(String),

    /// Gave up dialing after the retry ceiling.
    #[error("broker unreachable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Opening or closing a channel failed.
    #[error("channel error: {0}")]
    Channel(String),

    /// The connection was closed.
    #[error("broker connection closed")]
    ConnectionClosed,

    /// Exchange or queue re-declared with different properties.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Declaring an exchange or queue failed.
    #[error("declare failed: {0}")]
    Declare(String),

    /// The exchange does not exist.
    #[error("exchange not found: {0}")]
    ExchangeNotFound(String),

    /// The queue does not exist.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Binding a queue to the exchange failed.
    #[error("bind failed: {0}")]
    Bind(String),

    /// The broker refused the publish.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Starting or reading from a consumer failed.
    #[error("consume failed: {0}")]
    Consume(String),

    /// The delivery stream ended.
    #[error("consumer cancelled by broker")]
    ConsumerCancelled,

    /// Acknowledging a delivery failed.
    #[error("acknowledgement failed: {0}")]
    Ack(String),
}

impl BusError {
    /// Whether dialing again can clear the error. Topology conflicts and
    /// missing entities fail the same way on every connection.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::PreconditionFailed(_)
                | Self::Declare(_)
                | Self::ExchangeNotFound(_)
                | Self::QueueNotFound(_)
                | Self::Bind(_)
        )
    }
}

/// Error returned by an event handler. Logged by the consume loop, never
/// propagated to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
