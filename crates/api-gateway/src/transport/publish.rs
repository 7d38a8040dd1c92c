//! Event-publish adapter: hands the log entry to the topic exchange instead
//! of calling the logger directly.

use super::{expect_kind, Transport, TransportKind};
use crate::error::GatewayError;
use async_trait::async_trait;
use axum::http::StatusCode;
use relay_telemetry::{metric_inc, BUS_MESSAGES_PUBLISHED};
use shared_bus::EventPublisher;
use shared_types::{Outcome, Payload, PayloadKind, Severity, Topic};
use std::sync::Arc;
use tracing::{debug, error};

/// Message returned once the broker has accepted the entry.
pub const PUSHED_MESSAGE: &str = "Log pushed to queue";

pub struct PublishTransport {
    publisher: Arc<dyn EventPublisher>,
    topic: Topic,
}

impl PublishTransport {
    /// Publishes under `log.INFO`.
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_topic(publisher, Topic::log(Severity::Info))
    }

    pub fn with_topic(publisher: Arc<dyn EventPublisher>, topic: Topic) -> Self {
        Self { publisher, topic }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

#[async_trait]
impl Transport for PublishTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Publish
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Log
    }

    async fn invoke(&self, payload: Payload) -> Result<Outcome, GatewayError> {
        expect_kind(&payload, PayloadKind::Log)?;
        let Payload::Log(log) = payload else {
            return Err(GatewayError::Internal("payload kind mismatch".into()));
        };
        let body = serde_json::to_string(&log).map_err(|e| GatewayError::Internal(e.to_string()))?;

        self.publisher
            .push(&body, &self.topic)
            .await
            .map_err(|e| {
                error!(topic = %self.topic, error = %e, "Failed to push log event");
                GatewayError::PublishFailed(e.to_string())
            })?;

        metric_inc!(BUS_MESSAGES_PUBLISHED, &[self.topic.as_str()]);
        debug!(topic = %self.topic, title = %log.title, "Log event pushed");
        Ok(Outcome::ok(PUSHED_MESSAGE))
    }

    fn success_status(&self) -> StatusCode {
        StatusCode::ACCEPTED
    }
}
