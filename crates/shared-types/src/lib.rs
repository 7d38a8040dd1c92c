//! # Shared Types Crate
//!
//! Types that cross process boundaries: the action-tagged request envelope
//! accepted by the gateway, the payloads it carries, the uniform `Outcome`
//! every transport produces, and the topics used on the log exchange.
//!
//! ## Design Principles
//!
//! - **One payload per action**: an `ActionEnvelope` carries at most one
//!   populated payload; consumers ask for the kind they need and never read
//!   another.
//! - **Uniform result shape**: every downstream protocol is translated into an
//!   `Outcome` before it reaches a caller.

pub mod envelope;
pub mod errors;
pub mod outcome;
pub mod topic;

pub use envelope::{
    ActionEnvelope, AuthPayload, LogPayload, MailPayload, Payload, PayloadKind, RpcLogPayload,
};
pub use errors::TopicError;
pub use outcome::Outcome;
pub use topic::{Severity, Topic, DEFAULT_LOG_TOPICS, LOG_EXCHANGE};
