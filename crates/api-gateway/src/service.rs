//! HTTP surface of the gateway.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/` | liveness greeting |
//! | `POST` | `/handle` | [`Dispatcher::handle`] |
//! | `POST` | `/log/grpc` | direct gRPC `WriteLog` |
//! | `GET` | `/ping` | heartbeat (`.`) |
//! | `GET` | `/metrics` | Prometheus text format |

use crate::config::{CorsConfig, GatewayConfig};
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::transport::{GrpcTransport, Transport};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;
use shared_types::{ActionEnvelope, LogPayload, Outcome, Payload};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Handler state shared across requests
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    grpc_log: Arc<dyn Transport>,
    max_body_bytes: usize,
}

/// The gateway HTTP service
pub struct GatewayService {
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    grpc_log: Arc<dyn Transport>,
}

impl GatewayService {
    pub fn new(config: GatewayConfig, dispatcher: Dispatcher) -> Result<Self, GatewayError> {
        let grpc_log = Arc::new(GrpcTransport::new(
            &config.downstream.logger_grpc_url,
            config.downstream.grpc_timeout(),
        )?);
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            grpc_log,
        })
    }

    /// Replace the transport behind `/log/grpc`.
    #[must_use]
    pub fn with_grpc_log(mut self, transport: Arc<dyn Transport>) -> Self {
        self.grpc_log = transport;
        self
    }

    /// Build the router with CORS, tracing and body-limit layers.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            grpc_log: Arc::clone(&self.grpc_log),
            max_body_bytes: self.config.limits.max_body_bytes,
        };

        Router::new()
            .route("/", post(greet))
            .route("/handle", post(handle_action))
            .route("/log/grpc", post(log_via_grpc))
            .route("/ping", get(heartbeat))
            .route("/metrics", get(metrics))
            .layer(DefaultBodyLimit::max(self.config.limits.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&self.config.cors))
            .with_state(state)
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Internal(format!("bind {}: {}", addr, e)))?;
        info!(
            addr = %addr,
            actions = ?self.dispatcher.actions(),
            "Gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server error");
                GatewayError::Internal(e.to_string())
            })?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// CORS from config. Origins ending in `*` match by prefix.
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let patterns = config.allowed_origins.clone();
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|origin| patterns.iter().any(|pattern| origin_matches(pattern, origin)))
            .unwrap_or(false)
    });

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    let expose: Vec<HeaderName> = config
        .expose_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(expose)
        .allow_credentials(config.allow_credentials)
        .max_age(Duration::from_secs(config.max_age))
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix),
        None => pattern == origin,
    }
}

async fn greet() -> Json<Outcome> {
    Json(Outcome::ok("Hit the broker"))
}

async fn heartbeat() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], ".")
}

async fn metrics() -> Response {
    match relay_telemetry::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            GatewayError::Internal(e.to_string()).into_response()
        }
    }
}

async fn handle_action(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let envelope: ActionEnvelope = match decode_body(body, state.max_body_bytes) {
        Ok(envelope) => envelope,
        Err(err) => return err.into_response(),
    };

    let dispatched = state.dispatcher.handle(envelope).await;
    (dispatched.status, Json(dispatched.outcome)).into_response()
}

/// Body of `/log/grpc`: a bare log entry, unknown keys refused.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

async fn log_via_grpc(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let log: LogBody = match decode_body(body, state.max_body_bytes) {
        Ok(log) => log,
        Err(err) => return err.into_response(),
    };

    let payload = Payload::Log(LogPayload::new(log.title, log.content));
    match state.grpc_log.invoke(payload).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Decode exactly one JSON value from a request body.
///
/// Every failure is a 400 carrying a message that names the problem.
fn decode_body<T: DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
    limit: usize,
) -> Result<T, GatewayError> {
    let bytes = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::InvalidPayload(format!("body must not be larger than {} bytes", limit))
        } else {
            GatewayError::InvalidPayload(rejection.body_text())
        }
    })?;

    let mut values = serde_json::Deserializer::from_slice(&bytes).into_iter::<T>();
    let value = match values.next() {
        None => return Err(GatewayError::InvalidPayload("body must not be empty".into())),
        Some(Err(e)) => return Err(GatewayError::InvalidPayload(describe(&e, &bytes))),
        Some(Ok(value)) => value,
    };

    if values.next().is_some() {
        return Err(GatewayError::InvalidPayload(
            "body must only contain a single JSON value".into(),
        ));
    }
    Ok(value)
}

fn describe(err: &serde_json::Error, body: &[u8]) -> String {
    let at = char_offset(body, err.line(), err.column());
    match err.classify() {
        Category::Syntax => format!("body contains badly-formed JSON (at character {})", at),
        Category::Eof | Category::Io => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let message = err.to_string();
            if let Some(key) = unknown_field(&message) {
                format!("body contains unknown key: '{}'", key)
            } else if message.starts_with("invalid type") || message.starts_with("invalid value") {
                format!("body contains incorrect JSON type (at character {})", at)
            } else {
                message
            }
        }
    }
}

/// serde reports `unknown field `name`, expected ...`
fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}

/// Byte offset of a 1-based line and column.
fn char_offset(body: &[u8], line: usize, column: usize) -> usize {
    let preceding: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    preceding + column
}
