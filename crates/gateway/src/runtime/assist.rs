//! Assist orchestration: planner call, validation, persistence, and a dry
//! policy preview of every proposed action, with the full `ASSIST_*` audit
//! chain keyed by the request id.

use serde::Serialize;
use serde_json::json;

use wd_advisory::fallback::{build_fallback_proposal, build_prompt, FallbackRequest};
use wd_advisory::{apply_expert_action_permissions, select_expert_profile, AdvisoryMeta};
use wd_domain::error::Result;
use wd_domain::event::{EventRecord, Severity};
use wd_domain::intent::{IntentProposal, MAX_ACTIONS};
use wd_domain::requests::AssistRequest;
use wd_policy::{Constraints, RouteContext};

use crate::runtime::resolve_watch_condition;
use crate::state::AppState;

/// Policy preview for one proposed action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPreview {
    pub action_id: String,
    pub tool_key: String,
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
    pub constraints: Constraints,
}

/// The assist response surfaced to the caller.
#[derive(Debug, Serialize)]
pub struct AssistResponse {
    pub ok: bool,
    pub request_id: String,
    pub incident_id: String,
    pub watch_condition: String,
    pub proposal: IntentProposal,
    pub policy_preview: Vec<ActionPreview>,
    pub meta: AdvisoryMeta,
}

struct AssistCtx<'a> {
    state: &'a AppState,
    request_id: String,
    session_id: Option<String>,
    mode: String,
    source: &'a str,
}

impl AssistCtx<'_> {
    fn emit(&self, event_type: &str, payload: serde_json::Value, severity: Severity) {
        let event = EventRecord::new(
            event_type,
            self.source,
            self.state.clock.now_iso(),
            payload,
        )
        .severity(severity)
        .session_id(self.session_id.clone())
        .correlation_id(Some(self.request_id.clone()))
        .mode(Some(self.mode.clone()))
        .tags(&["assist"]);
        if let Err(error) = self.state.logbook.record_event(&event) {
            tracing::error!(%error, event_type, "failed to append assist event");
        }
    }
}

/// Run one assist request end to end: plan, validate, persist, preview.
pub async fn handle_assist(
    state: &AppState,
    req: &AssistRequest,
    source: &str,
) -> Result<AssistResponse> {
    let request_id = format!("req-{}", uuid::Uuid::new_v4().simple());
    let incident_id = req
        .incident_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let ctx = AssistCtx {
        state,
        request_id: request_id.clone(),
        session_id: req.session_id.clone(),
        mode: req.mode.as_str().to_owned(),
        source,
    };

    ctx.emit(
        "ASSIST_REQUEST_SUMMARY",
        json!({
            "request_id": request_id,
            "incident_id": incident_id,
            "mode": req.mode,
            "domain": req.domain,
            "urgency": req.urgency,
            "user_text_chars": req.user_text.trim().chars().count(),
            "stt_confidence": req.stt_confidence,
        }),
        Severity::Info,
    );

    let expert = select_expert_profile(req.domain, &req.user_text);
    let fallback_request = FallbackRequest {
        request_id: Some(request_id.clone()),
        session_id: req.session_id.clone(),
        mode: req.mode,
        domain: req.domain,
        urgency: req.urgency,
        user_text: req.user_text.clone(),
        max_actions: MAX_ACTIONS,
    };
    let fallback = build_fallback_proposal(&fallback_request, &expert, &state.clock.now_iso());
    let prompt = build_prompt(&fallback_request, &expert);

    let (mut proposal, meta) = state
        .advisory
        .generate_intent_proposal(&prompt, &fallback)
        .await?;

    // The audit chain is keyed by our request id; a planner inventing its
    // own id must not fork the correlation.
    proposal.request_id = request_id.clone();
    let dropped = apply_expert_action_permissions(&mut proposal, &expert);

    if meta.validation == "safe_fallback" {
        ctx.emit(
            "ASSIST_PROPOSAL_INVALID",
            json!({
                "request_id": request_id,
                "provider": meta.provider,
                "error": meta.error,
                "parse_mode": meta.parse_mode,
            }),
            Severity::Warn,
        );
    } else {
        ctx.emit(
            "ASSIST_PROPOSAL_RECEIVED",
            json!({
                "request_id": request_id,
                "provider": meta.provider,
                "actions": proposal.proposed_actions.len(),
                "dropped_by_expert": dropped,
                "expert_id": expert.expert_id,
            }),
            Severity::Info,
        );
        proposal.validate()?;
        ctx.emit(
            "ASSIST_PROPOSAL_VALIDATED",
            json!({
                "request_id": request_id,
                "needs_tools": proposal.needs_tools,
                "needs_clarification": proposal.needs_clarification,
            }),
            Severity::Info,
        );
    }

    state
        .logbook
        .upsert_intent(&proposal, source, &state.clock.now_iso())?;

    let watch_condition = resolve_watch_condition(
        req.watch_condition.as_deref(),
        proposal.mode.as_str(),
        &state.logbook,
        &state.config.default_watch_condition,
    );

    let mut previews = Vec::with_capacity(proposal.proposed_actions.len());
    for action in &proposal.proposed_actions {
        let routed = state.router.evaluate_action(RouteContext {
            incident_id: incident_id.clone(),
            watch_condition: watch_condition.clone(),
            tool_name: action.tool_name.clone(),
            args: action.parameters.clone(),
            source: source.to_owned(),
            stt_confidence: req.stt_confidence,
            foreground_process: state.foreground.foreground_process(),
            user_confirmed: false,
            user_confirm_token: None,
            action_requires_confirmation: action.requires_confirmation(),
            now_ts: state.clock.now_ts(),
            confirmation_ts: None,
            request_id: Some(request_id.clone()),
            action_id: Some(action.action_id.clone()),
            session_id: req.session_id.clone(),
            mode: Some(req.mode.as_str().to_owned()),
        })?;

        if routed.decision.requires_confirmation {
            ctx.emit(
                "ASSIST_CONFIRM_ISSUED",
                json!({
                    "request_id": request_id,
                    "action_id": action.action_id,
                    "tool_name": routed.tool_key,
                    "incident_id": incident_id,
                    "confirm_token": routed.confirm_token,
                    "confirm_by_ts": routed.decision.constraints.confirm_by_ts,
                }),
                Severity::Info,
            );
        }

        previews.push(ActionPreview {
            action_id: action.action_id.clone(),
            tool_key: routed.tool_key,
            allowed: routed.decision.allowed,
            requires_confirmation: routed.decision.requires_confirmation,
            reason_code: routed.decision.deny_reason_code.as_str().to_owned(),
            reason: routed.decision.deny_reason_text,
            confirm_token: routed.confirm_token,
            constraints: routed.decision.constraints,
        });
    }

    let allowed = previews.iter().filter(|p| p.allowed).count();
    let confirmations = previews.iter().filter(|p| p.requires_confirmation).count();
    ctx.emit(
        "ASSIST_POLICY_PREVIEW",
        json!({
            "request_id": request_id,
            "incident_id": incident_id,
            "watch_condition": watch_condition,
            "actions": previews.len(),
            "allowed": allowed,
            "requires_confirmation": confirmations,
            "denied": previews.len() - allowed - confirmations,
        }),
        Severity::Info,
    );

    ctx.emit(
        "ASSIST_PROPOSAL",
        json!({
            "request_id": request_id,
            "incident_id": incident_id,
            "validation": meta.validation,
            "needs_tools": proposal.needs_tools,
            "needs_clarification": proposal.needs_clarification,
            "response_text": proposal.response_text,
        }),
        Severity::Info,
    );

    Ok(AssistResponse {
        ok: true,
        request_id,
        incident_id,
        watch_condition,
        proposal,
        policy_preview: previews,
        meta,
    })
}
