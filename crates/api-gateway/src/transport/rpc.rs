//! Legacy RPC adapter.
//!
//! Calls `RPCServer.LogInfo` on the logger with JSON-RPC 1.0 framing: one
//! request object per line on a fresh TCP connection, one response object
//! back.
//!
//! ```text
//! → {"method":"RPCServer.LogInfo","params":[{"name":"..","data":".."}],"id":1}
//! ← {"id":1,"result":"Processed entry: ..","error":null}
//! ```

use super::{expect_kind, Transport, TransportKind};
use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Outcome, Payload, PayloadKind, RpcLogPayload};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Remote method that records one log entry.
pub const LOG_INFO_METHOD: &str = "RPCServer.LogInfo";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: [&'a RpcLogPayload; 1],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// One `LogInfo` call per invocation.
pub struct RpcTransport {
    addr: String,
    method: &'static str,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            method: LOG_INFO_METHOD,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, stream: TcpStream, entry: &RpcLogPayload) -> Result<String, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            method: self.method,
            params: [entry],
            id,
        };
        let mut line = serde_json::to_vec(&request).map_err(|e| e.to_string())?;
        line.push(b'\n');

        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(&line).await.map_err(|e| e.to_string())?;
        write_half.flush().await.map_err(|e| e.to_string())?;

        let mut reply = String::new();
        let read = BufReader::new(read_half)
            .read_line(&mut reply)
            .await
            .map_err(|e| e.to_string())?;
        if read == 0 {
            return Err("connection closed before reply".into());
        }

        let response: RpcResponse =
            serde_json::from_str(reply.trim_end()).map_err(|e| format!("bad reply: {}", e))?;
        if response.id.is_some_and(|reply_id| reply_id != id) {
            return Err(format!("reply id mismatch: sent {}", id));
        }
        match (response.error, response.result) {
            (Value::Null, Value::String(result)) => Ok(result),
            (Value::Null, other) => Err(format!("unexpected result: {}", other)),
            (Value::String(message), _) => Err(message),
            (other, _) => Err(other.to_string()),
        }
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Log
    }

    async fn invoke(&self, payload: Payload) -> Result<Outcome, GatewayError> {
        expect_kind(&payload, PayloadKind::Log)?;
        let Payload::Log(log) = payload else {
            return Err(GatewayError::Internal("payload kind mismatch".into()));
        };
        let entry = RpcLogPayload::from(log);

        let stream = match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, "RPC dial failed");
                return Err(GatewayError::TransportUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(addr = %self.addr, "RPC dial timed out");
                return Err(GatewayError::TransportUnavailable("dial timed out".into()));
            }
        };

        match timeout(self.timeout, self.call(stream, &entry)).await {
            Ok(Ok(result)) => {
                debug!(method = self.method, result = %result, "RPC call returned");
                Ok(Outcome::ok(result))
            }
            Ok(Err(message)) => {
                warn!(method = self.method, error = %message, "RPC call failed");
                Err(GatewayError::CallFailed(message))
            }
            Err(_) => {
                warn!(
                    method = self.method,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "RPC call timed out"
                );
                Err(GatewayError::CallFailed(format!(
                    "{} timed out after {}ms",
                    self.method,
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
