//! # Error Types
//!
//! Validation errors for shared types.

use thiserror::Error;

/// Errors raised when parsing a routing key or binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The topic string was empty.
    #[error("topic must not be empty")]
    Empty,

    /// A dot-separated word was empty (`log..INFO`, `log.`).
    #[error("topic contains an empty word: {0:?}")]
    EmptyWord(String),
}
