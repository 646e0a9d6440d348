//! Policy audit helpers layered over the event log.

use serde_json::{json, Value};

use wd_domain::event::{EventRecord, Severity};
use wd_domain::time::utc_now_iso;

use crate::store::Logbook;

/// Correlation fields shared by the audit helpers.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub request_id: Option<String>,
    pub action_id: Option<String>,
    pub session_id: Option<String>,
    pub mode: Option<String>,
}

impl Logbook {
    /// Record a policy decision (allow or deny) against an incident.
    /// Denies log at warn severity.
    pub fn log_decision(
        &self,
        incident_id: &str,
        tool_name: &str,
        decision: Value,
        ctx: &AuditContext,
    ) {
        let allowed = decision
            .get("allowed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let severity = if allowed { Severity::Info } else { Severity::Warn };
        let correlation = ctx
            .request_id
            .clone()
            .or_else(|| Some(incident_id.to_owned()).filter(|i| !i.is_empty()));
        let event = EventRecord::new(
            "POLICY_DECISION",
            "policy_router",
            utc_now_iso(),
            json!({
                "incident_id": incident_id,
                "tool_name": tool_name,
                "decision": decision,
                "context": {
                    "request_id": ctx.request_id,
                    "action_id": ctx.action_id,
                },
            }),
        )
        .severity(severity)
        .session_id(ctx.session_id.clone())
        .correlation_id(correlation)
        .mode(ctx.mode.clone())
        .tags(&["policy", "standing_orders"]);
        if let Err(error) = self.record_event(&event) {
            tracing::error!(%error, "failed to log policy decision");
        }
    }

    /// Record a tool execution outcome. Failures log at error severity.
    pub fn log_execute_result(
        &self,
        incident_id: &str,
        tool_name: &str,
        ok: bool,
        result_or_error: Value,
        ctx: &AuditContext,
    ) {
        let severity = if ok { Severity::Info } else { Severity::Error };
        let correlation = ctx
            .request_id
            .clone()
            .or_else(|| Some(incident_id.to_owned()).filter(|i| !i.is_empty()));
        let event = EventRecord::new(
            "TOOL_EXECUTE_RESULT",
            "policy_router",
            utc_now_iso(),
            json!({
                "incident_id": incident_id,
                "tool_name": tool_name,
                "ok": ok,
                "result_or_error": result_or_error,
            }),
        )
        .severity(severity)
        .session_id(ctx.session_id.clone())
        .correlation_id(correlation)
        .mode(ctx.mode.clone())
        .tags(&["policy", "standing_orders"]);
        if let Err(error) = self.record_event(&event) {
            tracing::error!(%error, "failed to log execute result");
        }
    }
}
