//! # Transport Adapters
//!
//! One capability interface, [`Transport::invoke`], over every downstream
//! protocol the gateway speaks. Each adapter makes at most one downstream
//! call per invocation and never retries; setup failures surface
//! immediately as a [`GatewayError`].
//!
//! | Adapter | Downstream | Success status |
//! |---------|------------|----------------|
//! | [`RestTransport`] | `POST {base}/v1/<resource>` | 200 |
//! | [`GrpcTransport`] | `logs.LogService/WriteLog` | 200 |
//! | [`RpcTransport`] | `RPCServer.LogInfo` over TCP | 200 |
//! | [`PublishTransport`] | topic exchange, `log.INFO` | 202 |

pub mod grpc;
pub mod publish;
pub mod rest;
pub mod rpc;

pub use grpc::GrpcTransport;
pub use publish::PublishTransport;
pub use rest::{RestTransport, StatusTable};
pub use rpc::RpcTransport;

use crate::config::{DownstreamConfig, LogTransportKind};
use crate::error::GatewayError;
use async_trait::async_trait;
use axum::http::StatusCode;
use shared_bus::EventPublisher;
use shared_types::{Outcome, Payload, PayloadKind};
use std::fmt;
use std::sync::Arc;

/// Protocol family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Rest,
    Grpc,
    Rpc,
    Publish,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rest => "rest",
            Self::Grpc => "grpc",
            Self::Rpc => "rpc",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// A downstream call that turns one payload into one [`Outcome`].
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// The payload variant this adapter reads from an envelope.
    fn payload_kind(&self) -> PayloadKind;

    async fn invoke(&self, payload: Payload) -> Result<Outcome, GatewayError>;

    /// HTTP status reported with a successful outcome.
    fn success_status(&self) -> StatusCode {
        StatusCode::OK
    }
}

/// Reject a payload of the wrong kind before any downstream work.
pub(crate) fn expect_kind(payload: &Payload, expected: PayloadKind) -> Result<(), GatewayError> {
    if payload.kind() == expected {
        Ok(())
    } else {
        Err(GatewayError::InvalidPayload(format!(
            "expected {} payload, got {}",
            expected,
            payload.kind()
        )))
    }
}

/// Build the adapter that carries the `log` action.
///
/// The queue transport needs a publisher; the others ignore it.
pub fn log_transport(
    kind: LogTransportKind,
    downstream: &DownstreamConfig,
    publisher: Option<Arc<dyn EventPublisher>>,
) -> Result<Arc<dyn Transport>, GatewayError> {
    let transport: Arc<dyn Transport> = match kind {
        LogTransportKind::Rest => Arc::new(RestTransport::log(
            &downstream.logger_url,
            downstream.timeout(),
        )?),
        LogTransportKind::Grpc => Arc::new(GrpcTransport::new(
            &downstream.logger_grpc_url,
            downstream.grpc_timeout(),
        )?),
        LogTransportKind::Rpc => Arc::new(RpcTransport::new(
            &downstream.logger_rpc_addr,
            downstream.timeout(),
        )),
        LogTransportKind::Queue => {
            let publisher = publisher.ok_or_else(|| {
                GatewayError::Internal("queue log transport needs a broker connection".into())
            })?;
            Arc::new(PublishTransport::new(publisher))
        }
    };
    Ok(transport)
}
