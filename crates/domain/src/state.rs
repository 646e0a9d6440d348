//! Current-state map items and the state-key naming contract.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::parse_iso8601_utc;

/// Prefixes accepted for ingested state keys. Supervisor-owned `system.*`
/// keys are written directly through the store and do not pass this gate.
pub const STATE_KEY_PREFIXES: [&str; 5] = ["ed.", "music.", "hw.", "policy.", "ai."];

fn state_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(\.[a-z0-9_]+)+$").expect("state key regex"))
}

/// Validate an ingested state key: lowercase dotted form with a known prefix.
pub fn validate_state_key(key: &str, index: usize) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::validation(format!(
            "items[{index}].state_key must be a non-empty string"
        )));
    }
    if !state_key_re().is_match(key) {
        return Err(Error::validation(format!(
            "items[{index}].state_key must match pattern: ^[a-z0-9]+(\\.[a-z0-9_]+)+$"
        )));
    }
    if !STATE_KEY_PREFIXES.iter().any(|p| key.starts_with(p)) {
        return Err(Error::validation(format!(
            "items[{index}].state_key must use one of prefixes: {}",
            STATE_KEY_PREFIXES.join(", ")
        )));
    }
    Ok(())
}

/// One observed state item, as ingested via `POST /state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateItem {
    pub state_key: String,
    pub state_value: serde_json::Value,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at_utc: Option<String>,
}

impl StateItem {
    pub fn validate(&self, index: usize) -> Result<()> {
        validate_state_key(&self.state_key, index)?;
        if self.source.trim().is_empty() {
            return Err(Error::validation(format!(
                "items[{index}].source must be a non-empty string"
            )));
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::validation(format!(
                    "items[{index}].confidence must be number 0..1"
                )));
            }
        }
        if let Some(observed_at) = &self.observed_at_utc {
            parse_iso8601_utc(observed_at)?;
        }
        Ok(())
    }
}

/// A state row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRow {
    pub state_key: String,
    pub state_value: serde_json::Value,
    pub source: String,
    pub confidence: Option<f64>,
    pub observed_at_utc: String,
    pub updated_at_utc: String,
}

impl StateRow {
    /// Loose truthiness for flag-style state values, mirroring how observers
    /// report booleans (raw bool, 0/1, "true"/"yes"/"on").
    pub fn is_truthy(&self) -> bool {
        match &self.state_value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            serde_json::Value::String(s) => {
                matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
            }
            _ => false,
        }
    }
}
