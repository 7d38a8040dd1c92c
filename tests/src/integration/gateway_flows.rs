//! # Gateway Flows
//!
//! `POST /handle` end to end through the standard route table against mock
//! downstream services.

#[cfg(test)]
mod tests {
    use crate::fixtures::{gateway, gateway_config, mock_rpc_logger, post, MockHttp};
    use api_gateway::LogTransportKind;
    use axum::http::StatusCode;
    use serde_json::json;
    use shared_types::Outcome;

    fn log_request() -> serde_json::Value {
        json!({"action": "log", "log": {"title": "build failed", "content": "stage 3"}})
    }

    #[tokio::test]
    async fn test_conflict_from_logger_is_forwarded() {
        let mut logger = MockHttp::start(StatusCode::CONFLICT, "").await;
        let router = gateway(gateway_config(&logger.base_url, LogTransportKind::Rest), None);

        let (status, outcome) = post(&router, "/handle", log_request()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(outcome, Outcome::failure("a conflict occurred"));
        let (resource, body) = logger.next().await;
        assert_eq!(resource, "logs");
        assert_eq!(body, json!({"title": "build failed", "content": "stage 3"}));
    }

    #[tokio::test]
    async fn test_authenticate_forwards_downstream_outcome() {
        let mut auth = MockHttp::start(
            StatusCode::ACCEPTED,
            r#"{"error":false,"message":"Logged in user admin@example.com","data":{"id":1}}"#,
        )
        .await;
        let router = gateway(gateway_config(&auth.base_url, LogTransportKind::Rpc), None);

        let (status, outcome) = post(
            &router,
            "/handle",
            json!({"action": "authenticate", "auth": {"email": "admin@example.com", "password": "secret"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome.message, "Logged in user admin@example.com");
        assert_eq!(outcome.data, Some(json!({"id": 1})));
        let (resource, body) = auth.next().await;
        assert_eq!(resource, "authenticate");
        assert_eq!(body["password"], "secret");
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let auth = MockHttp::start(StatusCode::UNAUTHORIZED, "").await;
        let router = gateway(gateway_config(&auth.base_url, LogTransportKind::Rpc), None);

        let (status, outcome) = post(
            &router,
            "/handle",
            json!({"action": "authenticate", "auth": {"email": "a@b.c", "password": "nope"}}),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(outcome, Outcome::failure("invalid credentials"));
    }

    #[tokio::test]
    async fn test_mail_goes_to_send_endpoint() {
        let mut mailer = MockHttp::start(
            StatusCode::ACCEPTED,
            r#"{"error":false,"message":"sent to ops@example.com"}"#,
        )
        .await;
        let router = gateway(gateway_config(&mailer.base_url, LogTransportKind::Rpc), None);

        let (status, outcome) = post(
            &router,
            "/handle",
            json!({"action": "mail", "mail": {"to": "ops@example.com", "message": "disk full"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, Outcome::ok("sent to ops@example.com"));
        let (resource, body) = mailer.next().await;
        assert_eq!(resource, "send");
        assert_eq!(body, json!({"to": "ops@example.com", "message": "disk full"}));
    }

    #[tokio::test]
    async fn test_log_over_legacy_rpc() {
        let http = MockHttp::start(StatusCode::ACCEPTED, "{}").await;
        let mut config = gateway_config(&http.base_url, LogTransportKind::Rpc);
        config.downstream.logger_rpc_addr = mock_rpc_logger().await;
        let router = gateway(config, None);

        let (status, outcome) = post(&router, "/handle", log_request()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, Outcome::ok("Processed entry: 1 | build failed"));
    }

    #[tokio::test]
    async fn test_unknown_action_touches_nothing() {
        let mut downstream = MockHttp::start(StatusCode::ACCEPTED, "{}").await;
        let router = gateway(gateway_config(&downstream.base_url, LogTransportKind::Rest), None);

        let (status, outcome) = post(&router, "/handle", json!({"action": "teleport"})).await;

        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(outcome, Outcome::failure("unknown action"));
        assert!(downstream.seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_payload_is_bad_request() {
        let mut downstream = MockHttp::start(StatusCode::ACCEPTED, "{}").await;
        let router = gateway(gateway_config(&downstream.base_url, LogTransportKind::Rest), None);

        let (status, outcome) = post(&router, "/handle", json!({"action": "mail"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(outcome.error);
        assert!(downstream.seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_logger_over_grpc() {
        let http = MockHttp::start(StatusCode::ACCEPTED, "{}").await;
        let mut config = gateway_config(&http.base_url, LogTransportKind::Grpc);
        // Nothing listens on the discard port
        config.downstream.logger_grpc_url = "http://127.0.0.1:9".to_string();
        config.downstream.grpc_timeout_ms = 500;
        let router = gateway(config, None);

        let (status, outcome) = post(&router, "/handle", log_request()).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(outcome, Outcome::failure("service unavailable"));
    }
}
