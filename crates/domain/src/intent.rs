//! Intent proposals and proposed actions: the contract between the planner
//! and the policy core.
//!
//! All enums are closed sets; unknown JSON keys are rejected at the serde
//! layer. [`IntentProposal::validate`] adds the bounds serde cannot express
//! (timestamp shape, list sizes, numeric ranges).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::parse_iso8601_utc;

/// Maximum proposed actions per intent.
pub const MAX_ACTIONS: usize = 10;

/// Maximum clarification questions per intent.
pub const MAX_CLARIFICATION_QUESTIONS: usize = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closed sets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Operating mode an intent was produced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Game,
    Work,
    Standby,
    Tutor,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Game => "game",
            Mode::Work => "work",
            Mode::Standby => "standby",
            Mode::Tutor => "tutor",
        }
    }
}

/// Subject domain of the user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Gameplay,
    Lore,
    Astrophysics,
    GeneralGaming,
    Coding,
    Networking,
    System,
    Music,
    Speech,
    General,
}

/// Urgency hint from the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
}

/// Risk classification of a proposed action. `HighRisk` actions additionally
/// require the caller to pass `allow_high_risk=true` at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    ReadOnly,
    LowRisk,
    HighRisk,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Proposed action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One planned tool invocation inside an intent proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposedAction {
    pub action_id: String,
    pub tool_name: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub safety_level: SafetyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_constraints: Option<Vec<Mode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<bool>,
    pub timeout_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub confidence: f64,
}

impl ProposedAction {
    /// Bounds checks beyond what serde enforces.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.action_id.is_empty() {
            return Err(Error::validation(format!(
                "proposed_actions[{index}].action_id must be a non-empty string"
            )));
        }
        if self.tool_name.is_empty() {
            return Err(Error::validation(format!(
                "proposed_actions[{index}].tool_name must be a non-empty string"
            )));
        }
        if !(100..=120_000).contains(&self.timeout_ms) {
            return Err(Error::validation(format!(
                "proposed_actions[{index}].timeout_ms must be integer 100..120000"
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::validation(format!(
                "proposed_actions[{index}].confidence must be number 0..1"
            )));
        }
        Ok(())
    }

    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation.unwrap_or(false)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent proposal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A full intent proposal, as posted to `/intent` or returned by the planner.
///
/// `retrieval` stays a free-form JSON object: planners attach citation ids,
/// confidence, expert metadata, and validation breadcrumbs there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentProposal {
    pub schema_version: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp_utc: String,
    pub mode: Mode,
    pub domain: Domain,
    pub urgency: Urgency,
    pub user_text: String,
    pub needs_tools: bool,
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<serde_json::Value>,
    pub proposed_actions: Vec<ProposedAction>,
    pub response_text: String,
}

impl IntentProposal {
    /// Full payload validation per the ingestion contract.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            return Err(Error::validation("schema_version must be '1.0'"));
        }
        if self.request_id.is_empty() {
            return Err(Error::validation("request_id must be a non-empty string"));
        }
        parse_iso8601_utc(&self.timestamp_utc)?;
        if self.user_text.trim().is_empty() {
            return Err(Error::validation("user_text must be a non-empty string"));
        }
        if self.clarification_questions.len() > MAX_CLARIFICATION_QUESTIONS {
            return Err(Error::validation(format!(
                "clarification_questions must have at most {MAX_CLARIFICATION_QUESTIONS} items"
            )));
        }
        for (idx, question) in self.clarification_questions.iter().enumerate() {
            if question.trim().is_empty() {
                return Err(Error::validation(format!(
                    "clarification_questions[{idx}] must be a non-empty string"
                )));
            }
        }
        if let Some(retrieval) = &self.retrieval {
            if !retrieval.is_object() {
                return Err(Error::validation("retrieval must be an object"));
            }
        }
        if self.proposed_actions.len() > MAX_ACTIONS {
            return Err(Error::validation(format!(
                "proposed_actions must have at most {MAX_ACTIONS} items"
            )));
        }
        for (idx, action) in self.proposed_actions.iter().enumerate() {
            action.validate(idx)?;
        }
        Ok(())
    }

    /// Parse and fully validate an intent proposal from a JSON value.
    ///
    /// Unknown keys are a validation error, not a deserialization panic.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let intent: IntentProposal =
            serde_json::from_value(value).map_err(|e| Error::validation(e.to_string()))?;
        intent.validate()?;
        Ok(intent)
    }
}
