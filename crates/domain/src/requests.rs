//! Request payloads for the HTTP surface: state ingest, confirm, execute,
//! feedback, and assist. Each struct rejects unknown keys and carries its own
//! bounds validation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::intent::Mode;
use crate::state::StateItem;
use crate::time::parse_iso8601_utc;

/// The six operational watch conditions.
pub const WATCH_CONDITIONS: [&str; 6] = [
    "STANDBY",
    "GAME",
    "WORK",
    "TUTOR",
    "RESTRICTED",
    "DEGRADED",
];

fn validate_watch_condition(value: &str) -> Result<()> {
    let upper = value.trim().to_uppercase();
    if upper.is_empty() {
        return Err(Error::validation(
            "watch_condition must be a non-empty string when supplied",
        ));
    }
    if !WATCH_CONDITIONS.contains(&upper.as_str()) {
        return Err(Error::validation(format!(
            "watch_condition must be one of: {}",
            WATCH_CONDITIONS.join(", ")
        )));
    }
    Ok(())
}

fn validate_optional_nonempty(value: &Option<String>, field: &str) -> Result<()> {
    if let Some(s) = value {
        if s.trim().is_empty() {
            return Err(Error::validation(format!(
                "{field} must be a non-empty string when supplied"
            )));
        }
    }
    Ok(())
}

fn validate_stt_confidence(value: Option<f64>) -> Result<()> {
    if let Some(c) = value {
        if !(0.0..=1.0).contains(&c) {
            return Err(Error::validation(
                "stt_confidence must be number 0..1 when supplied",
            ));
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateIngestRequest {
    pub items: Vec<StateItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit_events: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl StateIngestRequest {
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::validation(
                "items is required and must be a non-empty array",
            ));
        }
        for (idx, item) in self.items.iter().enumerate() {
            item.validate(idx)?;
        }
        validate_optional_nonempty(&self.session_id, "session_id")?;
        validate_optional_nonempty(&self.correlation_id, "correlation_id")?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /confirm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmRequest {
    pub incident_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_confirm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl ConfirmRequest {
    pub fn validate(&self) -> Result<()> {
        if self.incident_id.trim().is_empty() {
            return Err(Error::validation(
                "incident_id is required and must be a non-empty string",
            ));
        }
        if self.tool_name.trim().is_empty() {
            return Err(Error::validation(
                "tool_name is required and must be a non-empty string",
            ));
        }
        validate_optional_nonempty(&self.user_confirm_token, "user_confirm_token")?;
        if let Some(ts) = &self.confirmed_at_utc {
            parse_iso8601_utc(ts)?;
        }
        validate_optional_nonempty(&self.request_id, "request_id")?;
        validate_optional_nonempty(&self.session_id, "session_id")?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /execute
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteRequest {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_ids: Option<Vec<String>>,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub allow_high_risk: bool,
    #[serde(default)]
    pub user_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_confirm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at_utc: Option<String>,
}

impl ExecuteRequest {
    pub fn validate(&self) -> Result<()> {
        if self.request_id.trim().is_empty() {
            return Err(Error::validation(
                "request_id is required and must be a non-empty string",
            ));
        }
        if let Some(ids) = &self.action_ids {
            for (idx, id) in ids.iter().enumerate() {
                if id.trim().is_empty() {
                    return Err(Error::validation(format!(
                        "action_ids[{idx}] must be a non-empty string"
                    )));
                }
            }
        }
        validate_optional_nonempty(&self.user_confirm_token, "user_confirm_token")?;
        validate_optional_nonempty(&self.incident_id, "incident_id")?;
        if let Some(wc) = &self.watch_condition {
            validate_watch_condition(wc)?;
        }
        validate_stt_confidence(self.stt_confidence)?;
        if let Some(ts) = &self.confirmed_at_utc {
            parse_iso8601_utc(ts)?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /feedback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub rating: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<()> {
        if self.request_id.trim().is_empty() {
            return Err(Error::validation(
                "request_id is required and must be a non-empty string",
            ));
        }
        if self.rating != -1 && self.rating != 1 {
            return Err(Error::validation("rating must be -1 or 1"));
        }
        validate_optional_nonempty(&self.reviewer, "reviewer")?;
        validate_optional_nonempty(&self.session_id, "session_id")?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /assist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::intent::{Domain, Urgency};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistRequest {
    pub user_text: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AssistRequest {
    pub fn validate(&self) -> Result<()> {
        if self.user_text.trim().is_empty() {
            return Err(Error::validation(
                "user_text is required and must be a non-empty string",
            ));
        }
        validate_optional_nonempty(&self.incident_id, "incident_id")?;
        if let Some(wc) = &self.watch_condition {
            validate_watch_condition(wc)?;
        }
        validate_stt_confidence(self.stt_confidence)?;
        validate_optional_nonempty(&self.session_id, "session_id")?;
        Ok(())
    }
}
