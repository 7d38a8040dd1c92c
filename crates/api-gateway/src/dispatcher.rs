//! # Action Dispatcher
//!
//! Routes an [`ActionEnvelope`] to the transport registered for its
//! `action` and turns whatever comes back into a status plus [`Outcome`].
//!
//! | Action | Transport | Payload |
//! |--------|-----------|---------|
//! | `authenticate` | REST `auth` | `auth` |
//! | `log` | REST, gRPC, RPC or publish (configured) | `log` |
//! | `mail` | REST `mail` | `mail` |
//!
//! The dispatcher never retries: each envelope costs at most one downstream
//! call.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::transport::{log_transport, RestTransport, Transport};
use axum::http::StatusCode;
use relay_telemetry::{metric_inc, HistogramTimer, GATEWAY_REQUESTS, GATEWAY_REQUEST_DURATION};
use shared_bus::EventPublisher;
use shared_types::{ActionEnvelope, Outcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metrics label for actions nobody registered.
const UNKNOWN_ACTION_LABEL: &str = "unknown";

/// Result of one dispatch, ready to be written as an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub status: StatusCode,
    pub outcome: Outcome,
}

impl From<GatewayError> for Dispatched {
    fn from(err: GatewayError) -> Self {
        Self {
            status: err.status(),
            outcome: err.to_outcome(),
        }
    }
}

/// Action name to transport table.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<String, Arc<dyn Transport>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard route table: `authenticate`, `log` and `mail`.
    ///
    /// `publisher` is only consulted when the log transport is the queue.
    pub fn standard(
        config: &GatewayConfig,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Result<Self, GatewayError> {
        let downstream = &config.downstream;
        let mut dispatcher = Self::new();
        dispatcher.register(
            "authenticate",
            Arc::new(RestTransport::auth(&downstream.auth_url, downstream.timeout())?),
        );
        dispatcher.register(
            "log",
            log_transport(config.log_transport, downstream, publisher)?,
        );
        dispatcher.register(
            "mail",
            Arc::new(RestTransport::mail(&downstream.mailer_url, downstream.timeout())?),
        );
        Ok(dispatcher)
    }

    /// Register (or replace) the transport for an action.
    pub fn register(&mut self, action: impl Into<String>, transport: Arc<dyn Transport>) {
        let action = action.into();
        debug!(action = %action, transport = %transport.kind(), "Route registered");
        self.routes.insert(action, transport);
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Route one envelope to its transport.
    pub async fn dispatch(&self, mut envelope: ActionEnvelope) -> Result<Dispatched, GatewayError> {
        let transport = self
            .routes
            .get(&envelope.action)
            .ok_or_else(|| GatewayError::UnsupportedAction(envelope.action.clone()))?;

        let payload = envelope
            .payload(transport.payload_kind())
            .ok_or_else(|| GatewayError::InvalidPayload("invalid data".into()))?;

        let _timer = HistogramTimer::new(&GATEWAY_REQUEST_DURATION, &[envelope.action.as_str()]);
        let outcome = transport.invoke(payload).await?;
        Ok(Dispatched {
            status: transport.success_status(),
            outcome,
        })
    }

    /// Like [`Dispatcher::dispatch`] but folds every error into the uniform
    /// error outcome.
    pub async fn handle(&self, envelope: ActionEnvelope) -> Dispatched {
        let action = envelope.action.clone();
        let label = if self.routes.contains_key(&action) {
            action.as_str()
        } else {
            UNKNOWN_ACTION_LABEL
        };

        match self.dispatch(envelope).await {
            Ok(dispatched) => {
                metric_inc!(GATEWAY_REQUESTS, &[label, "ok"]);
                debug!(action = %action, status = dispatched.status.as_u16(), "Action handled");
                dispatched
            }
            Err(err) => {
                metric_inc!(GATEWAY_REQUESTS, &[label, err.label()]);
                warn!(action = %action, error = %err, "Action failed");
                err.into()
            }
        }
    }
}
