//! Append-only audit event records.

use serde::{Deserialize, Serialize};

/// Event severity, serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

/// One row of the append-only event log.
///
/// `correlation_id` equals the `request_id` for every event in an assist
/// chain, which is what makes the audit trail queryable end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub timestamp_utc: String,
    pub event_type: String,
    pub source: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventRecord {
    /// Start a new event with a fresh id and the given type/source/payload.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        timestamp_utc: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp_utc: timestamp_utc.into(),
            event_type: event_type.into(),
            source: source.into(),
            severity: Severity::Info,
            session_id: None,
            correlation_id: None,
            mode: None,
            payload,
            tags: Vec::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn session_id(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    pub fn correlation_id(mut self, correlation_id: Option<impl Into<String>>) -> Self {
        self.correlation_id = correlation_id.map(Into::into);
        self
    }

    pub fn mode(mut self, mode: Option<impl Into<String>>) -> Self {
        self.mode = mode.map(Into::into);
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_owned()).collect();
        self
    }
}

/// Anything that can accept audit events. The persistence façade implements
/// this; the policy router and executor depend on the trait, not the store.
pub trait EventSink: Send + Sync {
    fn append_event(&self, event: EventRecord);
}
