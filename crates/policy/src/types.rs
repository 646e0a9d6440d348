//! Policy evaluation inputs and outputs.

use serde::{Deserialize, Serialize};

/// Closed set of decision reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Allow,
    DenyNotAllowedInCondition,
    DenyExplicitlyDenied,
    DenyNeedsConfirmation,
    DenyConfirmationExpired,
    DenyLowSttConfidence,
    DenyForegroundMismatch,
    DenyRateLimit,
    DenyPolicyInvalid,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Allow => "ALLOW",
            ReasonCode::DenyNotAllowedInCondition => "DENY_NOT_ALLOWED_IN_CONDITION",
            ReasonCode::DenyExplicitlyDenied => "DENY_EXPLICITLY_DENIED",
            ReasonCode::DenyNeedsConfirmation => "DENY_NEEDS_CONFIRMATION",
            ReasonCode::DenyConfirmationExpired => "DENY_CONFIRMATION_EXPIRED",
            ReasonCode::DenyLowSttConfidence => "DENY_LOW_STT_CONFIDENCE",
            ReasonCode::DenyForegroundMismatch => "DENY_FOREGROUND_MISMATCH",
            ReasonCode::DenyRateLimit => "DENY_RATE_LIMIT",
            ReasonCode::DenyPolicyInvalid => "DENY_POLICY_INVALID",
        }
    }
}

/// One tool invocation, as presented to the engine for a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub incident_id: String,
    pub watch_condition: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_process: Option<String>,
    pub now_ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_confirm_token: Option<String>,
}

/// Decision constraints surfaced to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_by_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
}

/// The engine's verdict. Invariants: `allowed` implies `Allow`;
/// `requires_confirmation` implies `!allowed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
    pub deny_reason_code: ReasonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason_text: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Decision {
    pub fn allow(constraints: Constraints) -> Self {
        Self {
            allowed: true,
            requires_confirmation: false,
            deny_reason_code: ReasonCode::Allow,
            deny_reason_text: None,
            constraints,
        }
    }

    pub fn deny(code: ReasonCode, text: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            allowed: false,
            requires_confirmation: false,
            deny_reason_code: code,
            deny_reason_text: Some(text.into()),
            constraints,
        }
    }

    pub fn needs_confirmation(
        code: ReasonCode,
        text: impl Into<String>,
        constraints: Constraints,
    ) -> Self {
        Self {
            allowed: false,
            requires_confirmation: true,
            deny_reason_code: code,
            deny_reason_text: Some(text.into()),
            constraints,
        }
    }
}
