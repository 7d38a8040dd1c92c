//! REST adapter: one JSON POST per invocation.
//!
//! Downstream services answer `202 Accepted` with an [`Outcome`] body. Any
//! other status is translated through the endpoint's [`StatusTable`]; a
//! 202 whose body says `error: true` is a rejection too.

use super::{expect_kind, Transport, TransportKind};
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use shared_types::{Outcome, Payload, PayloadKind};
use std::time::Duration;
use tracing::{debug, warn};

/// Downstream status code to caller-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    entries: Vec<(u16, &'static str)>,
    fallback: &'static str,
    /// Status reported when a 202 body carries `error: true`
    rejection_status: u16,
}

impl StatusTable {
    /// Table for the logger service.
    pub fn log() -> Self {
        Self {
            entries: vec![
                (409, "a conflict occurred"),
                (400, "invalid data"),
                (504, "gateway timeout"),
                (404, "resource not found"),
            ],
            fallback: "log service could not process your request",
            rejection_status: 500,
        }
    }

    /// Table for the authentication service.
    pub fn auth() -> Self {
        Self {
            entries: vec![(401, "invalid credentials")],
            fallback: "auth service could not process your request",
            rejection_status: 401,
        }
    }

    /// Table for the mailer service.
    pub fn mail() -> Self {
        Self {
            entries: vec![(400, "invalid email data")],
            fallback: "mailer could not process your request",
            rejection_status: 500,
        }
    }

    pub fn message_for(&self, status: u16) -> &'static str {
        self.entries
            .iter()
            .find(|(code, _)| *code == status)
            .map_or(self.fallback, |(_, message)| message)
    }

    /// An accepted body may still report a failure.
    pub fn interpret(&self, outcome: Outcome) -> Result<Outcome, GatewayError> {
        if outcome.error {
            return Err(GatewayError::DownstreamRejected {
                status: self.rejection_status,
                message: outcome.message,
            });
        }
        Ok(outcome)
    }

    fn reject(&self, status: u16) -> GatewayError {
        GatewayError::DownstreamRejected {
            status,
            message: self.message_for(status).to_string(),
        }
    }
}

/// POSTs the payload as JSON to a fixed downstream URL.
pub struct RestTransport {
    url: String,
    payload_kind: PayloadKind,
    table: StatusTable,
    client: reqwest::Client,
}

impl RestTransport {
    pub fn new(
        url: impl Into<String>,
        payload_kind: PayloadKind,
        table: StatusTable,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            payload_kind,
            table,
            client,
        })
    }

    /// `POST {base}/v1/authenticate`
    pub fn auth(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Self::new(
            endpoint(base_url, "authenticate"),
            PayloadKind::Auth,
            StatusTable::auth(),
            timeout,
        )
    }

    /// `POST {base}/v1/logs`
    pub fn log(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Self::new(
            endpoint(base_url, "logs"),
            PayloadKind::Log,
            StatusTable::log(),
            timeout,
        )
    }

    /// `POST {base}/v1/send`
    pub fn mail(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        Self::new(
            endpoint(base_url, "send"),
            PayloadKind::Mail,
            StatusTable::mail(),
            timeout,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn endpoint(base_url: &str, resource: &str) -> String {
    format!("{}/v1/{}", base_url.trim_end_matches('/'), resource)
}

fn to_body(payload: &Payload) -> serde_json::Result<Value> {
    match payload {
        Payload::Auth(auth) => serde_json::to_value(auth),
        Payload::Log(log) => serde_json::to_value(log),
        Payload::Mail(mail) => serde_json::to_value(mail),
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    fn payload_kind(&self) -> PayloadKind {
        self.payload_kind
    }

    async fn invoke(&self, payload: Payload) -> Result<Outcome, GatewayError> {
        expect_kind(&payload, self.payload_kind)?;
        let body = to_body(&payload).map_err(|e| GatewayError::Internal(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.url, error = %e, "Downstream unreachable");
                if e.is_timeout() {
                    self.table.reject(StatusCode::GATEWAY_TIMEOUT.as_u16())
                } else {
                    GatewayError::TransportUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "Downstream answered");
        if status != StatusCode::ACCEPTED {
            return Err(self.table.reject(status.as_u16()));
        }

        let outcome: Outcome = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        self.table.interpret(outcome)
    }
}
