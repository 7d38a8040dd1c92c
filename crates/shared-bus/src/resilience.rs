//! # Connection Resilience Loop
//!
//! Establishes the process-wide broker connection at startup.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │
//!      └── backoff ────┤
//!                      └──► Failed   (more than max_failures in a row)
//! ```
//!
//! The loop runs once per process. Once it hands out a connection it is
//! not re-entered; callers that want to survive a later connection loss
//! must run it again themselves.

use crate::broker::{BrokerConnection, Dialer};
use crate::error::BusError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Retry ceiling and backoff shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_failures: u32,
    /// Unit of the quadratic backoff.
    pub base_delay: Duration,
    /// Upper bound on any single sleep.
    pub max_delay: Duration,
    /// Bound on a single dial.
    pub dial_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Sleep after the given number of consecutive failures:
    /// `failures² × base_delay`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = failures.saturating_mul(failures);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A connection handed out by the loop.
pub struct Established {
    pub connection: Arc<dyn BrokerConnection>,
    /// Dials it took, including the successful one.
    pub attempts: u32,
}

impl fmt::Debug for Established {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Established")
            .field("attempts", &self.attempts)
            .field("open", &self.connection.is_open())
            .finish()
    }
}

fn transition(state: &mut ConnectionState, next: ConnectionState) {
    debug!(from = %state, to = %next, "Broker connection state");
    *state = next;
}

/// Dial until the broker answers or the failure ceiling is passed.
#[instrument(skip_all, fields(target = %dialer.target()))]
pub async fn connect_with_backoff(
    dialer: &dyn Dialer,
    policy: &RetryPolicy,
) -> Result<Established, BusError> {
    let mut state = ConnectionState::Disconnected;
    let mut failures: u32 = 0;

    loop {
        transition(&mut state, ConnectionState::Connecting);
        let attempt = failures + 1;

        let dialed = match tokio::time::timeout(policy.dial_timeout, dialer.dial()).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Dial(format!(
                "dial timed out after {:?}",
                policy.dial_timeout
            ))),
        };

        match dialed {
            Ok(connection) => {
                transition(&mut state, ConnectionState::Connected);
                info!(attempts = attempt, "Connected to broker");
                return Ok(Established {
                    connection,
                    attempts: attempt,
                });
            }
            Err(e) => {
                failures += 1;
                warn!(attempt, error = %e, "Broker not yet ready");

                if failures > policy.max_failures {
                    transition(&mut state, ConnectionState::Failed);
                    error!(attempts = failures, "Giving up on broker");
                    return Err(BusError::RetriesExhausted {
                        attempts: failures,
                        last_error: e.to_string(),
                    });
                }

                transition(&mut state, ConnectionState::Disconnected);
                let delay = policy.backoff(failures);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
