//! # Resilience Flows
//!
//! Broker outages seen from both ends of the bus.

#[cfg(test)]
mod tests {
    use crate::fixtures::MockHttp;
    use axum::http::StatusCode;
    use log_listener::{ListenerConfig, ListenerRuntime, TitleRouter};
    use shared_bus::{
        connect_with_backoff, BusError, Dialer, EventPublisher, InMemoryBroker, LogPayload,
        Publisher, RetryPolicy, Topic, LOG_EXCHANGE,
    };
    use shared_types::Severity;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    fn listener(broker: &InMemoryBroker, logger_url: &str, reconnect: bool) -> Arc<ListenerRuntime> {
        let mut config = ListenerConfig {
            logger_url: logger_url.to_string(),
            timeout_ms: 2_000,
            reconnect,
            ..ListenerConfig::default()
        };
        config.broker.base_delay_ms = 5;
        let router = TitleRouter::standard(&config.logger_url, config.timeout()).unwrap();
        Arc::new(ListenerRuntime::new(
            config,
            Arc::new(broker.clone()),
            Arc::new(router),
        ))
    }

    async fn bound(broker: &InMemoryBroker) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.binding_count(LOG_EXCHANGE) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener never bound its topics");
    }

    async fn publish(broker: &InMemoryBroker, title: &str) {
        let established = connect_with_backoff(broker, &fast_policy()).await.unwrap();
        let publisher = Publisher::new(established.connection, LOG_EXCHANGE)
            .await
            .unwrap();
        let body = serde_json::to_string(&LogPayload::new(title, "c")).unwrap();
        publisher
            .push(&body, &Topic::log(Severity::Error))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_listener_waits_out_a_slow_broker() {
        let broker = InMemoryBroker::new();
        broker.fail_next_dials(3);
        let mut logger = MockHttp::start(StatusCode::ACCEPTED, r#"{"error":false,"message":"ok"}"#).await;
        let runtime = listener(&broker, &logger.base_url, false);
        tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        bound(&broker).await;
        assert_eq!(broker.dial_attempts(), 4);

        publish(&broker, "late start").await;
        assert_eq!(logger.next().await.1["title"], "late start");
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_listener_survives_broker_restart() {
        let broker = InMemoryBroker::new();
        let mut logger = MockHttp::start(StatusCode::ACCEPTED, r#"{"error":false,"message":"ok"}"#).await;
        let runtime = listener(&broker, &logger.base_url, true);
        let task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        bound(&broker).await;
        broker.shutdown();
        broker.fail_next_dials(2);
        bound(&broker).await;

        publish(&broker, "after restart").await;
        assert_eq!(logger.next().await.1["title"], "after restart");

        runtime.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publisher_gives_up_on_dead_broker() {
        let broker = InMemoryBroker::new();
        broker.fail_next_dials(u32::MAX);

        let result = connect_with_backoff(&broker, &fast_policy()).await;

        match result {
            Err(BusError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 6),
            other => panic!("expected retries to run out, got {:?}", other.map(|e| e.attempts)),
        }
        assert_eq!(broker.dial_attempts(), 6);
    }

    #[tokio::test]
    async fn test_publisher_connection_does_not_heal() {
        let broker = InMemoryBroker::new();
        let connection = broker.dial().await.unwrap();
        let publisher = Publisher::new(connection, LOG_EXCHANGE).await.unwrap();

        broker.shutdown();
        let result = publisher.push("{}", &Topic::log(Severity::Info)).await;

        assert!(result.is_err());
        assert_eq!(publisher.events_published(), 0);
    }
}
