//! # Log Listener
//!
//! Consumer process on the log exchange.
//!
//! ```text
//! logs_topic ──log.INFO / log.WARN / log.ERROR──► exclusive queue
//!                                                      │
//!                                                 TitleRouter
//!                                         ┌────────────┴────────────┐
//!                                      "auth"                   any other
//!                                   NoopHandler          LogWriter → POST /v1/logs
//! ```
//!
//! Startup waits for the broker with the shared resilience loop. Adding a
//! handler for a new title is a [`TitleRouter::route`] call; the consume
//! loop does not change.

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod handlers;
pub mod runtime;

pub use config::{ConfigError, ListenerConfig};
pub use handlers::{LogWriter, NoopHandler, TitleRouter};
pub use runtime::ListenerRuntime;
