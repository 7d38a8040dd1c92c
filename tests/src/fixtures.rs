//! Mock downstream services and request helpers.

use api_gateway::{Dispatcher, GatewayConfig, GatewayService, LogTransportKind};
use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::post as route_post;
use axum::{Json, Router};
use serde_json::Value;
use shared_bus::EventPublisher;
use shared_types::Outcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// A request seen by a mock downstream: resource name and JSON body.
pub type Seen = (String, Value);

/// HTTP service answering every `POST /v1/<resource>` the same way.
pub struct MockHttp {
    pub base_url: String,
    pub seen: mpsc::UnboundedReceiver<Seen>,
}

impl MockHttp {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        let (tx, seen) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/v1/:resource",
            route_post(move |Path(resource): Path<String>, Json(json): Json<Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((resource, json));
                    (status, body)
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            seen,
        }
    }

    /// Next request, failing the test after two seconds.
    pub async fn next(&mut self) -> Seen {
        tokio::time::timeout(Duration::from_secs(2), self.seen.recv())
            .await
            .expect("downstream was not called")
            .expect("downstream stopped")
    }
}

/// Legacy RPC logger: answers every `LogInfo` with `Processed entry: <n> | <name>`.
pub async fn mock_rpc_logger() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut entries = 0u64;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            entries += 1;
            let (read_half, mut write_half) = stream.into_split();
            let mut line = String::new();
            if BufReader::new(read_half).read_line(&mut line).await.is_err() {
                continue;
            }
            let request: Value = serde_json::from_str(&line).unwrap();
            let reply = serde_json::json!({
                "id": request["id"],
                "result": format!("Processed entry: {} | {}", entries, request["params"][0]["name"].as_str().unwrap_or("")),
                "error": null,
            });
            let _ = write_half.write_all(format!("{}\n", reply).as_bytes()).await;
        }
    });
    addr
}

/// Gateway config pointing every downstream at `base_url`.
pub fn gateway_config(base_url: &str, log_transport: LogTransportKind) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.downstream.auth_url = base_url.to_string();
    config.downstream.logger_url = base_url.to_string();
    config.downstream.mailer_url = base_url.to_string();
    config.downstream.timeout_ms = 2_000;
    config.log_transport = log_transport;
    config
}

/// The full gateway router with the standard route table.
pub fn gateway(config: GatewayConfig, publisher: Option<Arc<dyn EventPublisher>>) -> Router {
    let dispatcher = Dispatcher::standard(&config, publisher).unwrap();
    GatewayService::new(config, dispatcher).unwrap().router()
}

/// POST a JSON body and decode the Outcome.
pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Outcome) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}
