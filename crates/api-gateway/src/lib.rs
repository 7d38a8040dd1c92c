//! # API Gateway
//!
//! Single HTTP entry point in front of the authentication, logger and mailer
//! services.
//!
//! ## Architecture
//!
//! ```text
//!              POST /handle {"action": "...", "<kind>": {...}}
//!                              │
//!                     ┌────────┴────────┐
//!                     │   Dispatcher    │  action → Transport
//!                     └────────┬────────┘
//!        ┌──────────────┬──────┴───────┬────────────────┐
//!        ▼              ▼              ▼                ▼
//!   RestTransport  GrpcTransport  RpcTransport   PublishTransport
//!   POST /v1/...   WriteLog       LogInfo        logs_topic (log.INFO)
//! ```
//!
//! Every adapter answers with the same [`Outcome`](shared_types::Outcome)
//! shape; failures carry `error: true` and the status from
//! [`GatewayError::status`].
//!
//! ## Usage
//!
//! ```ignore
//! use api_gateway::{Dispatcher, GatewayConfig, GatewayService};
//!
//! let config = GatewayConfig::from_env()?;
//! let dispatcher = Dispatcher::standard(&config, None)?;
//! GatewayService::new(config, dispatcher)?
//!     .serve(async { let _ = tokio::signal::ctrl_c().await; })
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod service;
pub mod transport;

pub use config::{
    ConfigError, CorsConfig, DownstreamConfig, GatewayConfig, HttpConfig, LimitsConfig,
    LogTransportKind,
};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{GatewayError, INTERNAL_MESSAGE};
pub use service::{create_cors_layer, GatewayService};
pub use transport::{
    log_transport, GrpcTransport, PublishTransport, RestTransport, RpcTransport, StatusTable,
    Transport, TransportKind,
};
