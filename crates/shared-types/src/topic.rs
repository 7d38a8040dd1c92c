//! # Topics
//!
//! Dot-delimited routing keys on the log exchange (`log.INFO`, `log.WARN`,
//! `log.ERROR`). The same type is used for binding patterns, which may
//! contain the `*` and `#` wildcards.

use crate::errors::TopicError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the process-wide topic exchange carrying log events.
pub const LOG_EXCHANGE: &str = "logs_topic";

/// Topics the log listener binds by default.
pub const DEFAULT_LOG_TOPICS: [&str; 3] = ["log.INFO", "log.WARN", "log.ERROR"];

/// Log severity, the second word of a log routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated routing key or binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Validate a routing key or pattern: non-empty, no empty words.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TopicError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }
        if raw.split('.').any(str::is_empty) {
            return Err(TopicError::EmptyWord(raw));
        }
        Ok(Self(raw))
    }

    /// `log.<SEVERITY>`
    #[must_use]
    pub fn log(severity: Severity) -> Self {
        Self(format!("log.{}", severity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the topic contains `*` or `#` words.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        self.0.split('.').any(|word| word == "*" || word == "#")
    }

    /// The default listener bindings.
    #[must_use]
    pub fn default_log_topics() -> Vec<Topic> {
        vec![
            Topic::log(Severity::Info),
            Topic::log(Severity::Warn),
            Topic::log(Severity::Error),
        ]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::parse(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::parse(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
