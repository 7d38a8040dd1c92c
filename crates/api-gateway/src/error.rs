//! Gateway error taxonomy.
//!
//! Every failure that reaches a caller is rendered as an [`Outcome`] with
//! `error = true` and a human-readable message. Internal detail stays in the
//! logs; only [`GatewayError::public_message`] crosses the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared_types::Outcome;
use thiserror::Error;

/// Message shown for any internal failure.
pub const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Gateway-level errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No transport is registered for the action
    #[error("unknown action: {0}")]
    UnsupportedAction(String),

    /// The downstream could not be reached
    #[error("service unavailable: {0}")]
    TransportUnavailable(String),

    /// The downstream answered with a failure
    #[error("downstream rejected request ({status}): {message}")]
    DownstreamRejected { status: u16, message: String },

    /// The downstream answered with a body that could not be decoded
    #[error("malformed downstream response: {0}")]
    MalformedResponse(String),

    /// The broker refused the message
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The remote procedure returned an error
    #[error("remote call failed: {0}")]
    CallFailed(String),

    /// The caller sent something the gateway cannot use
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status reported to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedAction(_) => StatusCode::NOT_IMPLEMENTED,
            Self::TransportUnavailable(_) | Self::MalformedResponse(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::DownstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::PublishFailed(_) | Self::CallFailed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show the caller
    pub fn public_message(&self) -> String {
        match self {
            Self::UnsupportedAction(_) => "unknown action".to_string(),
            Self::TransportUnavailable(_) => "service unavailable".to_string(),
            Self::DownstreamRejected { message, .. } => message.clone(),
            Self::MalformedResponse(_) => "downstream service sent an unreadable response".to_string(),
            Self::PublishFailed(_) => "could not push log to queue".to_string(),
            Self::InvalidPayload(message) => message.clone(),
            Self::CallFailed(_) | Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }

    /// The uniform error outcome
    pub fn to_outcome(&self) -> Outcome {
        Outcome::failure(self.public_message())
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnsupportedAction(_) => "unsupported",
            Self::TransportUnavailable(_) => "unavailable",
            Self::DownstreamRejected { .. } => "rejected",
            Self::MalformedResponse(_) => "malformed",
            Self::PublishFailed(_) => "publish_failed",
            Self::CallFailed(_) => "call_failed",
            Self::InvalidPayload(_) => "invalid",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_outcome())).into_response()
    }
}
