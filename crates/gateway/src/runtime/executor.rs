//! The action executor: drives queued proposed actions through
//! queued → approved → success/error/timeout/denied with a full audit trail.
//!
//! Gates run in order: terminal short-circuit, mode constraint, high-risk,
//! then the tool router (the only path into the policy engine). Every
//! status transition emits its matching event, so a cancelled or crashed
//! actuator can never leave an action parked in `approved`.

use serde::Serialize;
use serde_json::{json, Value};

use wd_domain::error::{Error, Result};
use wd_domain::event::{EventRecord, Severity};
use wd_domain::requests::ExecuteRequest;
use wd_domain::time::iso8601_utc_to_epoch;
use wd_logbook::audit::AuditContext;
use wd_logbook::{ActionRow, IntentRow};
use wd_policy::{Constraints, ReasonCode, RouteContext};

use crate::runtime::resolve_watch_condition;
use crate::state::AppState;

/// Fallback per-action budget when a stored action carries no timeout.
const DEFAULT_TIMEOUT_MS: i64 = 30_000;

/// Per-action outcome returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub tool_name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ActionOutcome {
    fn new(row: &ActionRow, status: impl Into<String>) -> Self {
        Self {
            action_id: row.action_id.clone(),
            tool_name: row.tool_name.clone(),
            status: status.into(),
            message: None,
            reason_code: None,
            reason: None,
            confirm_token: None,
            constraints: None,
            output: None,
            error: None,
            error_code: None,
        }
    }
}

/// Whole-request execution result.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    pub watch_condition: String,
    pub dry_run: bool,
    pub results: Vec<ActionOutcome>,
}

#[derive(Clone)]
struct ExecCtx {
    state: AppState,
    intent: IntentRow,
    watch_condition: String,
    incident_id: String,
    source: String,
}

impl ExecCtx {
    fn emit(&self, event_type: &str, payload: Value, severity: Severity) {
        let event = EventRecord::new(
            event_type,
            self.source.clone(),
            self.state.clock.now_iso(),
            payload,
        )
        .severity(severity)
        .session_id(self.intent.session_id.clone())
        .correlation_id(Some(self.intent.request_id.clone()))
        .mode(Some(self.intent.mode.clone()));
        if let Err(error) = self.state.logbook.record_event(&event) {
            tracing::error!(%error, event_type, "failed to append executor event");
        }
    }

    fn audit_ctx(&self, action_id: &str) -> AuditContext {
        AuditContext {
            request_id: Some(self.intent.request_id.clone()),
            action_id: Some(action_id.to_owned()),
            session_id: self.intent.session_id.clone(),
            mode: Some(self.intent.mode.clone()),
        }
    }
}

/// Execute the queued actions of one intent. Terminal actions are left
/// untouched and reported as `already finalized`.
pub async fn execute_actions(
    state: &AppState,
    req: &ExecuteRequest,
    source: &str,
) -> Result<ExecuteResponse> {
    let intent = state
        .logbook
        .get_intent(&req.request_id)?
        .ok_or_else(|| Error::NotFound(format!("request_id not found: {}", req.request_id)))?;

    let watch_condition = resolve_watch_condition(
        req.watch_condition.as_deref(),
        &intent.mode,
        &state.logbook,
        &state.config.default_watch_condition,
    );
    let incident_id = req
        .incident_id
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .to_owned();
    let confirmed_at_epoch = match &req.confirmed_at_utc {
        Some(ts) => Some(iso8601_utc_to_epoch(ts)?),
        None => None,
    };

    let rows = state
        .logbook
        .list_actions(&req.request_id, req.action_ids.as_deref())?;

    let ctx = ExecCtx {
        state: state.clone(),
        intent,
        watch_condition: watch_condition.clone(),
        incident_id: incident_id.clone(),
        source: source.to_owned(),
    };

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(run_action(&ctx, &row, req, confirmed_at_epoch).await);
    }

    Ok(ExecuteResponse {
        request_id: req.request_id.clone(),
        incident_id: Some(incident_id).filter(|i| !i.is_empty()),
        watch_condition,
        dry_run: req.dry_run,
        results,
    })
}

async fn run_action(
    ctx: &ExecCtx,
    row: &ActionRow,
    req: &ExecuteRequest,
    confirmed_at_epoch: Option<f64>,
) -> ActionOutcome {
    if row.is_terminal() {
        let mut outcome = ActionOutcome::new(row, row.status.clone());
        outcome.message = Some("already finalized".into());
        return outcome;
    }

    let params = row.params();
    let state = &ctx.state;

    // Mode gate, ahead of policy: the proposal itself restricted the modes
    // this action may run in.
    if !params.mode_constraints.is_empty() && !params.mode_constraints.contains(&ctx.intent.mode) {
        let reason = format!("mode '{}' not in action mode_constraints", ctx.intent.mode);
        return deny_action(ctx, row, "DENY_MODE_CONSTRAINT", &reason);
    }

    // High-risk gate: explicit caller opt-in required.
    if row.safety_level == "high_risk" && !req.allow_high_risk {
        return deny_action(
            ctx,
            row,
            "DENY_HIGH_RISK_NOT_ALLOWED",
            "high_risk action requires allow_high_risk=true",
        );
    }

    let foreground = state.foreground.foreground_process();
    let routed = state.router.evaluate_action(RouteContext {
        incident_id: ctx.incident_id.clone(),
        watch_condition: ctx.watch_condition.clone(),
        tool_name: row.tool_name.clone(),
        args: params.parameters.clone(),
        source: ctx.source.to_owned(),
        stt_confidence: req.stt_confidence,
        foreground_process: foreground,
        user_confirmed: req.user_confirmed,
        user_confirm_token: req.user_confirm_token.clone(),
        action_requires_confirmation: params.requires_confirmation,
        now_ts: state.clock.now_ts(),
        confirmation_ts: confirmed_at_epoch,
        request_id: Some(ctx.intent.request_id.clone()),
        action_id: Some(row.action_id.clone()),
        session_id: ctx.intent.session_id.clone(),
        mode: Some(ctx.intent.mode.clone()),
    });
    let routed = match routed {
        Ok(routed) => routed,
        Err(error) => {
            // A standing-orders reload failure is a request-level fault, not
            // a per-action denial; surface it on this action as an error.
            tracing::error!(%error, "policy evaluation failed");
            let mut outcome = ActionOutcome::new(row, "error");
            outcome.error = Some(error.to_string());
            outcome.error_code = Some("policy_error".into());
            return outcome;
        }
    };

    let decision = routed.decision;
    let reason_code = decision.deny_reason_code.as_str().to_owned();
    let reason = decision.deny_reason_text.clone().unwrap_or_default();

    if decision.requires_confirmation {
        let now_iso = state.clock.now_iso();
        if let Err(error) =
            state
                .logbook
                .action_requires_confirmation(row.id, &reason_code, &reason, &now_iso)
        {
            tracing::error!(%error, "failed to stamp confirmation requirement");
        }
        let event_type = if decision.deny_reason_code == ReasonCode::DenyConfirmationExpired {
            "ACTION_CONFIRMATION_EXPIRED"
        } else {
            "ACTION_CONFIRMATION_REQUIRED"
        };
        ctx.emit(
            event_type,
            json!({
                "request_id": ctx.intent.request_id,
                "action_id": row.action_id,
                "tool_name": row.tool_name,
                "incident_id": ctx.incident_id,
                "watch_condition": ctx.watch_condition,
                "policy_decision": decision,
                "confirm_token": routed.confirm_token,
            }),
            Severity::Warn,
        );
        let mut outcome = ActionOutcome::new(row, "requires_confirmation");
        outcome.reason_code = Some(reason_code);
        outcome.reason = Some(reason);
        outcome.confirm_token = routed.confirm_token;
        outcome.constraints = Some(decision.constraints);
        return outcome;
    }

    if !decision.allowed {
        let now_iso = state.clock.now_iso();
        if let Err(error) = state
            .logbook
            .action_denied(row.id, &reason_code, &reason, &now_iso)
        {
            tracing::error!(%error, "failed to mark action denied");
        }
        ctx.emit(
            "ACTION_DENIED",
            json!({
                "request_id": ctx.intent.request_id,
                "action_id": row.action_id,
                "tool_name": row.tool_name,
                "reason": reason,
                "reason_code": reason_code,
                "incident_id": ctx.incident_id,
                "watch_condition": ctx.watch_condition,
                "policy_decision": decision,
            }),
            Severity::Warn,
        );
        let mut outcome = ActionOutcome::new(row, "denied");
        outcome.reason_code = Some(reason_code);
        outcome.reason = Some(reason);
        return outcome;
    }

    // Approved: hand over to the actuator. The whole approved -> terminal
    // sequence runs in a detached task so a cancelled request can never
    // strand an action in `approved`.
    let task = {
        let ctx = ctx.clone();
        let row = row.clone();
        let dry_run = req.dry_run;
        tokio::spawn(async move { approve_and_dispatch(ctx, row, params, decision, dry_run).await })
    };
    match task.await {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::error!(%error, action_id = %row.action_id, "dispatch task failed");
            let mut outcome = ActionOutcome::new(row, "error");
            outcome.error = Some(error.to_string());
            outcome.error_code = Some("execution_error".into());
            outcome
        }
    }
}

/// Mark an action approved, drive the actuator under the per-action budget,
/// and finalize to `success`, `error`, or `timeout` with the matching audit
/// events. Runs detached from the surrounding request.
async fn approve_and_dispatch(
    ctx: ExecCtx,
    row: ActionRow,
    params: wd_logbook::StoredActionParams,
    decision: wd_policy::Decision,
    dry_run: bool,
) -> ActionOutcome {
    let state = &ctx.state;
    let row = &row;

    let started_at = state.clock.now_iso();
    if let Err(error) = state.logbook.action_approved(row.id, &started_at) {
        tracing::error!(%error, "failed to mark action approved");
    }
    ctx.emit(
        "ACTION_APPROVED",
        json!({
            "request_id": ctx.intent.request_id,
            "action_id": row.action_id,
            "tool_name": row.tool_name,
            "incident_id": ctx.incident_id,
            "watch_condition": ctx.watch_condition,
            "policy_decision": decision,
        }),
        Severity::Info,
    );

    let timeout_ms = params
        .timeout_ms
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .clamp(100, 120_000) as u64;
    let dispatch = state.dispatcher.execute(
        &row.tool_name,
        &params.parameters,
        &ctx.intent.request_id,
        &row.action_id,
        dry_run,
    );
    let dispatched =
        tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), dispatch).await;

    let (status, output, error_code, error_message) = match dispatched {
        Ok(Ok(output)) => ("success", Some(output), None, None),
        Ok(Err(error)) => (
            "error",
            None,
            Some("execution_error".to_owned()),
            Some(error.to_string()),
        ),
        Err(_) => (
            "timeout",
            None,
            Some("timeout".to_owned()),
            Some(format!("execution exceeded {timeout_ms}ms budget")),
        ),
    };

    let ended_at = state.clock.now_iso();
    if let Err(error) = state.logbook.action_finalized(
        row.id,
        status,
        output.as_ref(),
        error_code.as_deref(),
        error_message.as_deref(),
        &ended_at,
    ) {
        tracing::error!(%error, "failed to finalize action");
    }

    if status == "success" {
        let output_value = output.clone().unwrap_or(Value::Null);
        state.logbook.log_execute_result(
            &ctx.incident_id,
            &row.tool_name,
            true,
            output_value.clone(),
            &ctx.audit_ctx(&row.action_id),
        );
        ctx.emit(
            "ACTION_EXECUTED",
            json!({
                "request_id": ctx.intent.request_id,
                "action_id": row.action_id,
                "tool_name": row.tool_name,
                "dry_run": dry_run,
                "incident_id": ctx.incident_id,
                "watch_condition": ctx.watch_condition,
                "stub_execution": output_value.get("stub_execution").cloned().unwrap_or(Value::Bool(false)),
                "result": output_value.get("result").cloned(),
            }),
            Severity::Info,
        );
        let mut outcome = ActionOutcome::new(row, "success");
        outcome.output = output;
        return outcome;
    }

    state.logbook.log_execute_result(
        &ctx.incident_id,
        &row.tool_name,
        false,
        json!(error_message),
        &ctx.audit_ctx(&row.action_id),
    );
    ctx.emit(
        "ACTION_FAILED",
        json!({
            "request_id": ctx.intent.request_id,
            "action_id": row.action_id,
            "tool_name": row.tool_name,
            "incident_id": ctx.incident_id,
            "watch_condition": ctx.watch_condition,
            "error_code": error_code,
            "error_message": error_message,
        }),
        Severity::Error,
    );
    let mut outcome = ActionOutcome::new(row, status);
    outcome.error = error_message;
    outcome.error_code = error_code;
    outcome
}

/// Synthesized denial ahead of policy (mode constraint, high-risk gate).
fn deny_action(
    ctx: &ExecCtx,
    row: &ActionRow,
    reason_code: &str,
    reason: &str,
) -> ActionOutcome {
    let now_iso = ctx.state.clock.now_iso();
    if let Err(error) = ctx
        .state
        .logbook
        .action_denied(row.id, reason_code, reason, &now_iso)
    {
        tracing::error!(%error, "failed to mark action denied");
    }
    let policy_decision = json!({
        "allowed": false,
        "requires_confirmation": false,
        "deny_reason_code": reason_code,
        "deny_reason_text": reason,
        "constraints": {},
    });
    ctx.emit(
        "ACTION_DENIED",
        json!({
            "request_id": ctx.intent.request_id,
            "action_id": row.action_id,
            "tool_name": row.tool_name,
            "reason": reason,
            "reason_code": reason_code,
            "incident_id": ctx.incident_id,
            "watch_condition": ctx.watch_condition,
            "policy_decision": policy_decision,
        }),
        Severity::Warn,
    );
    let mut outcome = ActionOutcome::new(row, "denied");
    outcome.reason_code = Some(reason_code.to_owned());
    outcome.reason = Some(reason.to_owned());
    outcome
}
