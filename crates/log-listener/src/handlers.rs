//! # Event Handlers
//!
//! Events are routed by their `title`. The `auth` title is reserved for
//! authentication side effects and currently does nothing; every other title
//! is written to the logger service.

use api_gateway::{GatewayError, RestTransport, Transport};
use async_trait::async_trait;
use relay_telemetry::{metric_inc, BUS_HANDLER_FAILURES, BUS_MESSAGES_CONSUMED};
use shared_bus::{EventHandler, HandlerError};
use shared_types::{LogPayload, Payload};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Metrics label for events that fall through to the default handler.
const DEFAULT_ROUTE: &str = "default";

/// Accepts an event and does nothing with it.
pub struct NoopHandler;

#[async_trait]
impl EventHandler for NoopHandler {
    async fn handle(&self, payload: LogPayload) -> Result<(), HandlerError> {
        debug!(title = %payload.title, "Event ignored");
        Ok(())
    }
}

/// Writes events to the logger service's `/v1/logs`.
pub struct LogWriter {
    transport: RestTransport,
}

impl LogWriter {
    pub fn new(logger_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            transport: RestTransport::log(logger_url, timeout)?,
        })
    }
}

#[async_trait]
impl EventHandler for LogWriter {
    async fn handle(&self, payload: LogPayload) -> Result<(), HandlerError> {
        let title = payload.title.clone();
        let outcome = self
            .transport
            .invoke(Payload::Log(payload))
            .await
            .map_err(|e| HandlerError::new(e.public_message()))?;
        info!(title = %title, message = %outcome.message, "Event logged");
        Ok(())
    }
}

/// Picks a handler by event title, falling back to a default.
pub struct TitleRouter {
    routes: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Arc<dyn EventHandler>,
}

impl TitleRouter {
    pub fn new(fallback: Arc<dyn EventHandler>) -> Self {
        Self {
            routes: HashMap::new(),
            fallback,
        }
    }

    /// `auth` is ignored, everything else goes to the logger.
    pub fn standard(logger_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self::new(Arc::new(LogWriter::new(logger_url, timeout)?))
            .route("auth", Arc::new(NoopHandler)))
    }

    /// Send events titled `title` to `handler`.
    #[must_use]
    pub fn route(mut self, title: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.routes.insert(title.into(), handler);
        self
    }

    fn select(&self, title: &str) -> (&str, &Arc<dyn EventHandler>) {
        match self.routes.get_key_value(title) {
            Some((route, handler)) => (route.as_str(), handler),
            None => (DEFAULT_ROUTE, &self.fallback),
        }
    }
}

#[async_trait]
impl EventHandler for TitleRouter {
    async fn handle(&self, payload: LogPayload) -> Result<(), HandlerError> {
        let (route, handler) = self.select(&payload.title);
        metric_inc!(BUS_MESSAGES_CONSUMED, &[route]);

        let result = handler.handle(payload).await;
        if result.is_err() {
            metric_inc!(BUS_HANDLER_FAILURES, &[route]);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use tokio::sync::mpsc;

    /// Forwards every payload to a channel.
    struct Recording(mpsc::UnboundedSender<LogPayload>);

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle(&self, payload: LogPayload) -> Result<(), HandlerError> {
            let _ = self.0.send(payload);
            Ok(())
        }
    }

    /// Logger stub answering every POST with `status`, recording bodies.
    async fn logger(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/v1/logs",
            post(move |Json(body): Json<Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body);
                    (status, r#"{"error":false,"message":"Log Inserted"}"#)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_routes_by_title() {
        let (auth_tx, mut auth_rx) = mpsc::unbounded_channel();
        let (default_tx, mut default_rx) = mpsc::unbounded_channel();
        let router = TitleRouter::new(Arc::new(Recording(default_tx)))
            .route("auth", Arc::new(Recording(auth_tx)));

        router.handle(LogPayload::new("auth", "login")).await.unwrap();
        router.handle(LogPayload::new("deploy", "v2")).await.unwrap();

        assert_eq!(auth_rx.recv().await.unwrap().content, "login");
        assert_eq!(default_rx.recv().await.unwrap().title, "deploy");
        assert!(auth_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_log_writer_posts_entry() {
        let (base, mut bodies) = logger(StatusCode::ACCEPTED).await;
        let writer = LogWriter::new(&base, Duration::from_secs(2)).unwrap();

        writer
            .handle(LogPayload::new("build failed", "stage 3"))
            .await
            .unwrap();

        let body = bodies.recv().await.unwrap();
        assert_eq!(body["title"], "build failed");
        assert_eq!(body["content"], "stage 3");
    }

    #[tokio::test]
    async fn test_log_writer_reports_status_message() {
        let (base, _bodies) = logger(StatusCode::CONFLICT).await;
        let writer = LogWriter::new(&base, Duration::from_secs(2)).unwrap();

        let err = writer.handle(LogPayload::new("t", "c")).await.unwrap_err();
        assert_eq!(err, HandlerError::new("a conflict occurred"));
    }

    #[tokio::test]
    async fn test_auth_events_never_reach_logger() {
        let (base, mut bodies) = logger(StatusCode::ACCEPTED).await;
        let router = TitleRouter::standard(&base, Duration::from_secs(2)).unwrap();

        router.handle(LogPayload::new("auth", "login")).await.unwrap();
        router.handle(LogPayload::new("deploy", "v2")).await.unwrap();

        assert_eq!(bodies.recv().await.unwrap()["title"], "deploy");
        assert!(bodies.try_recv().is_err());
    }
}
