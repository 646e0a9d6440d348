//! The tool router: the single entry point through which decisions are
//! produced.
//!
//! Canonicalizes the tool name, derives or accepts a confirmation token,
//! records user-granted confirmations, consults the policy engine, applies
//! the action-metadata confirmation gate, and logs every decision. The
//! executor and the assist preview both route through here; neither calls
//! the engine directly.

use std::sync::Arc;

use serde_json::json;

use wd_domain::error::Result;
use wd_domain::event::{EventRecord, EventSink, Severity};
use wd_domain::time::utc_now_iso;

use crate::canonical::canonical_tool_name;
use crate::engine::PolicyEngine;
use crate::types::{ActionRequest, Constraints, Decision, ReasonCode};

/// Derive the default confirmation token for a proposal:
/// `confirm-{first 12 of incident}-{tool key, dots to dashes}`.
pub fn build_confirmation_token(incident_id: &str, tool_key: &str) -> String {
    let prefix: String = incident_id.chars().take(12).collect();
    format!("confirm-{prefix}-{}", tool_key.replace('.', "-"))
}

/// Everything the router needs to know about one action evaluation.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub incident_id: String,
    pub watch_condition: String,
    pub tool_name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub source: String,
    pub stt_confidence: Option<f64>,
    pub foreground_process: Option<String>,
    pub user_confirmed: bool,
    pub user_confirm_token: Option<String>,
    pub action_requires_confirmation: bool,
    pub now_ts: f64,
    pub confirmation_ts: Option<f64>,
    // Audit correlation only.
    pub request_id: Option<String>,
    pub action_id: Option<String>,
    pub session_id: Option<String>,
    pub mode: Option<String>,
}

/// What the router hands back to callers.
#[derive(Debug, Clone)]
pub struct RoutedDecision {
    pub decision: Decision,
    pub tool_key: String,
    /// Present exactly when the decision requires confirmation.
    pub confirm_token: Option<String>,
}

/// Routes every proposed tool invocation through policy, stamping
/// confirmation requirements and emitting the `POLICY_DECISION` audit event.
pub struct ToolRouter {
    engine: Arc<PolicyEngine>,
    sink: Option<Arc<dyn EventSink>>,
    source: String,
}

impl ToolRouter {
    pub fn new(engine: Arc<PolicyEngine>, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            engine,
            sink,
            source: "policy_router".into(),
        }
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Evaluate one action. See the module docs for the full algorithm.
    pub fn evaluate_action(&self, ctx: RouteContext) -> Result<RoutedDecision> {
        let tool_key = canonical_tool_name(&ctx.tool_name);
        let confirm_token = ctx
            .user_confirm_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| build_confirmation_token(&ctx.incident_id, &tool_key));

        if ctx.user_confirmed {
            self.engine.record_confirmation(
                &ctx.incident_id,
                &tool_key,
                &confirm_token,
                ctx.confirmation_ts.unwrap_or(ctx.now_ts),
            );
        }

        let token_forwarded = ctx.user_confirmed || ctx.user_confirm_token.is_some();
        let req = ActionRequest {
            incident_id: ctx.incident_id.clone(),
            watch_condition: ctx.watch_condition.clone(),
            tool_name: ctx.tool_name.clone(),
            args: ctx.args.clone(),
            source: ctx.source.clone(),
            stt_confidence: ctx.stt_confidence,
            foreground_process: ctx.foreground_process.clone(),
            now_ts: ctx.now_ts,
            user_confirm_token: token_forwarded.then(|| confirm_token.clone()),
        };

        let mut decision = self.engine.evaluate(&req)?;

        // Action-metadata gate: a proposal can demand confirmation even when
        // the Standing Orders alone would allow the tool.
        if decision.allowed && ctx.action_requires_confirmation && !ctx.user_confirmed {
            let window = self.engine.confirm_window_seconds();
            decision = Decision::needs_confirmation(
                ReasonCode::DenyNeedsConfirmation,
                "action metadata requires user confirmation",
                Constraints {
                    confirm_by_ts: Some(ctx.now_ts + window),
                    ..Constraints::default()
                },
            );
        }

        if decision.requires_confirmation && decision.constraints.confirm_token.is_none() {
            decision.constraints.confirm_token = Some(confirm_token.clone());
        }

        self.log_decision(&ctx, &tool_key, &decision);

        let confirm_token = decision
            .requires_confirmation
            .then_some(confirm_token);

        Ok(RoutedDecision {
            decision,
            tool_key,
            confirm_token,
        })
    }

    fn log_decision(&self, ctx: &RouteContext, tool_key: &str, decision: &Decision) {
        let Some(sink) = &self.sink else { return };
        let severity = if decision.allowed {
            Severity::Info
        } else {
            Severity::Warn
        };
        let correlation = ctx
            .request_id
            .clone()
            .or_else(|| Some(ctx.incident_id.clone()).filter(|i| !i.is_empty()));
        let event = EventRecord::new(
            "POLICY_DECISION",
            self.source.clone(),
            utc_now_iso(),
            json!({
                "incident_id": ctx.incident_id,
                "tool_name": tool_key,
                "decision": decision,
                "context": {
                    "request_id": ctx.request_id,
                    "action_id": ctx.action_id,
                    "watch_condition": ctx.watch_condition,
                    "source": ctx.source,
                    "stt_confidence": ctx.stt_confidence,
                    "foreground_process": ctx.foreground_process,
                },
            }),
        )
        .severity(severity)
        .session_id(ctx.session_id.clone())
        .correlation_id(correlation)
        .mode(ctx.mode.clone())
        .tags(&["policy", "standing_orders"]);
        sink.append_event(event);
    }
}
