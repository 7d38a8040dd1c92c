//! # Action Envelope
//!
//! The request shape accepted by the gateway's `/handle` endpoint:
//!
//! ```json
//! { "action": "log", "log": { "title": "build failed", "content": "stage 3" } }
//! ```
//!
//! Each payload kind has its own optional field. The dispatcher asks for the
//! kind its adapter needs through [`ActionEnvelope::payload`]; unpopulated
//! variants are never read.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials forwarded to the authentication service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A single log line. Also the body of every message on the log exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl LogPayload {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Outbound mail request. `from` and `subject` fall back to mailer defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Log entry in the field naming used by the RPC and gRPC log services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcLogPayload {
    pub name: String,
    pub data: String,
}

impl From<LogPayload> for RpcLogPayload {
    fn from(log: LogPayload) -> Self {
        Self {
            name: log.title,
            data: log.content,
        }
    }
}

/// Discriminant of [`Payload`], used by adapters to declare what they consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Auth,
    Log,
    Mail,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Auth => write!(f, "auth"),
            PayloadKind::Log => write!(f, "log"),
            PayloadKind::Mail => write!(f, "mail"),
        }
    }
}

/// A populated payload, extracted from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Auth(AuthPayload),
    Log(LogPayload),
    Mail(MailPayload),
}

impl Payload {
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Auth(_) => PayloadKind::Auth,
            Payload::Log(_) => PayloadKind::Log,
            Payload::Mail(_) => PayloadKind::Mail,
        }
    }
}

/// Inbound gateway request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionEnvelope {
    /// Selects the transport adapter.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailPayload>,
}

impl ActionEnvelope {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthPayload) -> Self {
        self.auth = Some(auth);
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: LogPayload) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn with_mail(mut self, mail: MailPayload) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Take the payload of the requested kind, leaving the others untouched.
    ///
    /// Returns `None` when the caller did not populate that variant.
    pub fn payload(&mut self, kind: PayloadKind) -> Option<Payload> {
        match kind {
            PayloadKind::Auth => self.auth.take().map(Payload::Auth),
            PayloadKind::Log => self.log.take().map(Payload::Log),
            PayloadKind::Mail => self.mail.take().map(Payload::Mail),
        }
    }
}
