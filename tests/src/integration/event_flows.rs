//! # Event Flows
//!
//! Gateway `log` actions published to the topic exchange and picked up by
//! the log listener, which writes them to the logger service.

#[cfg(test)]
mod tests {
    use crate::fixtures::{gateway, gateway_config, post, MockHttp};
    use api_gateway::LogTransportKind;
    use axum::http::StatusCode;
    use log_listener::{ListenerConfig, ListenerRuntime, TitleRouter};
    use serde_json::json;
    use shared_bus::{Dialer, EventPublisher, InMemoryBroker, Publisher, LOG_EXCHANGE};
    use shared_types::Outcome;
    use std::sync::Arc;
    use std::time::Duration;

    async fn publisher(broker: &InMemoryBroker) -> Arc<dyn EventPublisher> {
        let connection = broker.dial().await.unwrap();
        Arc::new(Publisher::new(connection, LOG_EXCHANGE).await.unwrap())
    }

    /// Listener writing to `logger_url`, running in the background. Returns
    /// once the exchange carries `bindings` bindings.
    async fn start_listener(
        broker: &InMemoryBroker,
        logger_url: &str,
        bindings: usize,
    ) -> Arc<ListenerRuntime> {
        let config = ListenerConfig {
            logger_url: logger_url.to_string(),
            timeout_ms: 2_000,
            ..ListenerConfig::default()
        };
        let router = TitleRouter::standard(&config.logger_url, config.timeout()).unwrap();
        let runtime = Arc::new(ListenerRuntime::new(
            config,
            Arc::new(broker.clone()),
            Arc::new(router),
        ));
        tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.binding_count(LOG_EXCHANGE) < bindings {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener never bound its topics");
        runtime
    }

    #[tokio::test]
    async fn test_queued_log_reaches_logger() {
        let broker = InMemoryBroker::new();
        let mut logger = MockHttp::start(
            StatusCode::ACCEPTED,
            r#"{"error":false,"message":"Log Inserted"}"#,
        )
        .await;
        let listener = start_listener(&broker, &logger.base_url, 3).await;
        let router = gateway(
            gateway_config(&logger.base_url, LogTransportKind::Queue),
            Some(publisher(&broker).await),
        );

        let (status, outcome) = post(
            &router,
            "/handle",
            json!({"action": "log", "log": {"title": "deploy", "content": "v2 rolled out"}}),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(outcome, Outcome::ok("Log pushed to queue"));
        let (resource, body) = logger.next().await;
        assert_eq!(resource, "logs");
        assert_eq!(body, json!({"title": "deploy", "content": "v2 rolled out"}));

        listener.shutdown();
    }

    #[tokio::test]
    async fn test_auth_events_are_not_logged() {
        let broker = InMemoryBroker::new();
        let mut logger = MockHttp::start(StatusCode::ACCEPTED, r#"{"error":false,"message":"ok"}"#).await;
        let listener = start_listener(&broker, &logger.base_url, 3).await;
        let router = gateway(
            gateway_config(&logger.base_url, LogTransportKind::Queue),
            Some(publisher(&broker).await),
        );

        for title in ["auth", "after auth"] {
            let (status, _) = post(
                &router,
                "/handle",
                json!({"action": "log", "log": {"title": title, "content": "c"}}),
            )
            .await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }

        let (_, body) = logger.next().await;
        assert_eq!(body["title"], "after auth");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(logger.seen.try_recv().is_err());

        listener.shutdown();
    }

    #[tokio::test]
    async fn test_every_listener_gets_a_copy() {
        let broker = InMemoryBroker::new();
        let mut first = MockHttp::start(StatusCode::ACCEPTED, r#"{"error":false,"message":"ok"}"#).await;
        let mut second = MockHttp::start(StatusCode::ACCEPTED, r#"{"error":false,"message":"ok"}"#).await;
        let a = start_listener(&broker, &first.base_url, 3).await;
        let b = start_listener(&broker, &second.base_url, 6).await;

        let router = gateway(
            gateway_config(&first.base_url, LogTransportKind::Queue),
            Some(publisher(&broker).await),
        );
        let (status, _) = post(
            &router,
            "/handle",
            json!({"action": "log", "log": {"title": "fanout", "content": "c"}}),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(first.next().await.1["title"], "fanout");
        assert_eq!(second.next().await.1["title"], "fanout");

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_publish_after_broker_loss_fails() {
        let broker = InMemoryBroker::new();
        let logger = MockHttp::start(StatusCode::ACCEPTED, "{}").await;
        let router = gateway(
            gateway_config(&logger.base_url, LogTransportKind::Queue),
            Some(publisher(&broker).await),
        );

        broker.shutdown();
        let (status, outcome) = post(
            &router,
            "/handle",
            json!({"action": "log", "log": {"title": "lost", "content": "c"}}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(outcome.error);
    }
}
