//! gRPC adapter for the logger's `logs.LogService/WriteLog`.
//!
//! The wire messages are declared by hand with `prost` derives:
//!
//! ```text
//! message Log         { string name = 1; string data = 2; }
//! message LogRequest  { Log entry = 1; }
//! message LogResponse { string response = 1; }
//! service LogService  { rpc WriteLog(LogRequest) returns (LogResponse); }
//! ```

use super::{expect_kind, Transport, TransportKind};
use crate::error::GatewayError;
use async_trait::async_trait;
use shared_types::{Outcome, Payload, PayloadKind, RpcLogPayload};
use std::time::Duration;
use tonic::codec::ProstCodec;
use tonic::transport::Endpoint;
use tracing::{debug, warn};

/// Fully qualified method path.
pub const WRITE_LOG_PATH: &str = "/logs.LogService/WriteLog";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Log {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub data: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogRequest {
    #[prost(message, optional, tag = "1")]
    pub entry: Option<Log>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LogResponse {
    #[prost(string, tag = "1")]
    pub response: String,
}

impl From<RpcLogPayload> for Log {
    fn from(payload: RpcLogPayload) -> Self {
        Self {
            name: payload.name,
            data: payload.data,
        }
    }
}

/// One unary `WriteLog` call per invocation, bounded by a deadline.
pub struct GrpcTransport {
    endpoint: Endpoint,
    timeout: Duration,
}

impl GrpcTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let endpoint = Endpoint::from_shared(url.to_string())
            .map_err(|e| GatewayError::Internal(format!("grpc endpoint {}: {}", url, e)))?
            .connect_timeout(timeout)
            .timeout(timeout);
        Ok(Self { endpoint, timeout })
    }

    async fn write_log(&self, entry: Log) -> Result<LogResponse, String> {
        let channel = self.endpoint.connect().await.map_err(|e| e.to_string())?;
        let mut client = tonic::client::Grpc::new(channel);
        client.ready().await.map_err(|e| e.to_string())?;

        let codec: ProstCodec<LogRequest, LogResponse> = ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(WRITE_LOG_PATH);
        let request = tonic::Request::new(LogRequest { entry: Some(entry) });

        let response = client
            .unary(request, path, codec)
            .await
            .map_err(|status| format!("{:?}: {}", status.code(), status.message()))?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Log
    }

    async fn invoke(&self, payload: Payload) -> Result<Outcome, GatewayError> {
        expect_kind(&payload, PayloadKind::Log)?;
        let Payload::Log(log) = payload else {
            return Err(GatewayError::Internal("payload kind mismatch".into()));
        };
        let entry = Log::from(RpcLogPayload::from(log));

        match tokio::time::timeout(self.timeout, self.write_log(entry)).await {
            Ok(Ok(response)) => {
                debug!(response = %response.response, "WriteLog answered");
                Ok(Outcome::ok(response.response))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "WriteLog failed");
                Err(GatewayError::TransportUnavailable(e))
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "WriteLog deadline exceeded");
                Err(GatewayError::TransportUnavailable("deadline exceeded".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use shared_types::{LogPayload, MailPayload};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::codegen::{Body, BoxFuture, Context, Poll, Service, StdError};

    /// Logger stub: records each entry and answers `logged <name>`.
    #[derive(Clone)]
    struct WriteLog(mpsc::UnboundedSender<Log>);

    impl tonic::server::UnaryService<LogRequest> for WriteLog {
        type Response = LogResponse;
        type Future = BoxFuture<tonic::Response<LogResponse>, tonic::Status>;

        fn call(&mut self, request: tonic::Request<LogRequest>) -> Self::Future {
            let tx = self.0.clone();
            Box::pin(async move {
                let entry = request.into_inner().entry.unwrap_or_default();
                let response = format!("logged {}", entry.name);
                let _ = tx.send(entry);
                Ok(tonic::Response::new(LogResponse { response }))
            })
        }
    }

    #[derive(Clone)]
    struct LogService(WriteLog);

    impl tonic::server::NamedService for LogService {
        const NAME: &'static str = "logs.LogService";
    }

    impl<B> Service<http::Request<B>> for LogService
    where
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: http::Request<B>) -> Self::Future {
            let write_log = self.0.clone();
            Box::pin(async move {
                let codec: ProstCodec<LogResponse, LogRequest> = ProstCodec::default();
                let mut grpc = tonic::server::Grpc::new(codec);
                Ok(grpc.unary(write_log, request).await)
            })
        }
    }

    async fn serve_logger() -> (String, mpsc::UnboundedReceiver<Log>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(LogService(WriteLog(tx)))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_write_log_forwards_response() {
        let (url, mut entries) = serve_logger().await;
        let transport = GrpcTransport::new(&url, Duration::from_secs(2)).unwrap();

        let outcome = transport
            .invoke(Payload::Log(LogPayload::new("build failed", "stage 3")))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ok("logged build failed"));
        let entry = entries.recv().await.unwrap();
        assert_eq!(entry.name, "build failed");
        assert_eq!(entry.data, "stage 3");
    }

    #[test]
    fn test_request_wire_format() {
        let request = LogRequest {
            entry: Some(Log {
                name: "a".into(),
                data: "b".into(),
            }),
        };
        // field 1 (len 6) { field 1 "a", field 2 "b" }
        assert_eq!(
            request.encode_to_vec(),
            vec![0x0a, 0x06, 0x0a, 0x01, b'a', 0x12, 0x01, b'b']
        );
    }

    #[test]
    fn test_response_decodes() {
        let bytes = [0x0a, 0x02, b'o', b'k'];
        let response = LogResponse::decode(&bytes[..]).unwrap();
        assert_eq!(response.response, "ok");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(GrpcTransport::new("not a uri", Duration::from_secs(2)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_logger_is_service_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            GrpcTransport::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();
        let err = transport
            .invoke(Payload::Log(LogPayload::new("t", "c")))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::TransportUnavailable(_)));
        assert_eq!(err.to_outcome(), Outcome::failure("service unavailable"));
    }

    #[tokio::test]
    async fn test_non_log_payload_rejected() {
        let transport = GrpcTransport::new("http://logger:50001", Duration::from_secs(2)).unwrap();
        let err = transport
            .invoke(Payload::Mail(MailPayload::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPayload(_)));
    }
}
