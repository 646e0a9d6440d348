//! Deterministic fallback planning: the proposal used when the planner is
//! stubbed out, and the safe clarification-only proposal used when planner
//! output fails validation.

use serde_json::{json, Value};

use wd_domain::error::Result;
use wd_domain::intent::{Domain, IntentProposal, Mode, ProposedAction, SafetyLevel, Urgency};

use crate::experts::ExpertProfile;

/// Longest validation-error breadcrumb kept in `retrieval`.
const MAX_ERROR_CHARS: usize = 300;

/// What the fallback builder needs to know about the assist request.
#[derive(Debug, Clone)]
pub struct FallbackRequest {
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    pub mode: Mode,
    pub domain: Option<Domain>,
    pub urgency: Option<Urgency>,
    pub user_text: String,
    pub max_actions: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inference
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Guess a domain from keywords when the request does not declare one.
pub fn infer_domain(user_text: &str) -> Domain {
    let text = user_text.to_lowercase();
    let hit = |words: &[&str]| words.iter().any(|w| text.contains(w));
    if hit(&["thargoid", "guardian", "lore", "galnet"]) {
        Domain::Lore
    } else if hit(&["python", "golang", "rust", "code", "coding", "compile"]) {
        Domain::Coding
    } else if hit(&["network", "dns", "router", "switch"]) {
        Domain::Networking
    } else if hit(&["music", "track", "song", "album"]) {
        Domain::Music
    } else if hit(&["ship", "jump", "hardpoint", "lights", "supercruise"]) {
        Domain::Gameplay
    } else if hit(&["cpu", "memory", "temperature", "system"]) {
        Domain::System
    } else {
        Domain::General
    }
}

pub fn infer_urgency(user_text: &str) -> Urgency {
    let text = user_text.to_lowercase();
    if ["urgent", "immediately", "right now", "emergency"]
        .iter()
        .any(|w| text.contains(w))
    {
        Urgency::High
    } else {
        Urgency::Normal
    }
}

fn extract_keypress(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if lower.contains("space") {
        return Some("space");
    }
    const NAMED: [&str; 7] = ["enter", "tab", "esc", "up", "down", "left", "right"];
    for key in NAMED {
        if lower.contains(key) {
            return Some(key);
        }
    }
    const FKEYS: [&str; 12] = [
        "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12",
    ];
    // Scan high to low so "f12" is not shadowed by "f1".
    FKEYS.iter().rev().find(|k| lower.contains(*k)).copied()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stub actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn params_of(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn media_action(action_id: &str, tool_name: &str, reason: &str, confidence: f64) -> ProposedAction {
    ProposedAction {
        action_id: action_id.to_owned(),
        tool_name: tool_name.to_owned(),
        parameters: serde_json::Map::new(),
        safety_level: SafetyLevel::LowRisk,
        mode_constraints: Some(vec![Mode::Game, Mode::Work, Mode::Standby]),
        requires_confirmation: Some(false),
        timeout_ms: 1200,
        reason: Some(reason.to_owned()),
        confidence,
    }
}

/// Deterministic actions derived from request phrasing. These back the stub
/// planner mode and the fallback proposal.
pub fn stub_actions(user_text: &str, max_actions: usize, allow_actions: bool) -> Vec<ProposedAction> {
    if max_actions == 0 || !allow_actions {
        return Vec::new();
    }
    let text = user_text.to_lowercase();
    let mut actions = Vec::new();

    if let Some(key) = extract_keypress(user_text) {
        if text.contains("press") || text.contains("key") {
            actions.push(ProposedAction {
                action_id: format!("action_keypress_{key}"),
                tool_name: "keypress".into(),
                parameters: params_of(&[("key", json!(key))]),
                safety_level: SafetyLevel::HighRisk,
                mode_constraints: Some(vec![Mode::Game]),
                requires_confirmation: Some(true),
                timeout_ms: 1500,
                reason: Some(format!("User requested keypress '{key}'.")),
                confidence: 0.9,
            });
        }
    }

    if text.contains("light") || text.contains("scene") {
        let scene = if text.contains("combat") {
            "combat"
        } else if text.contains("exploration") {
            "exploration"
        } else if text.contains("docking") {
            "docking"
        } else {
            "default"
        };
        actions.push(ProposedAction {
            action_id: "action_set_lights".into(),
            tool_name: "set_lights".into(),
            parameters: params_of(&[("scene", json!(scene))]),
            safety_level: SafetyLevel::LowRisk,
            mode_constraints: Some(vec![Mode::Game, Mode::Work, Mode::Standby, Mode::Tutor]),
            requires_confirmation: Some(false),
            timeout_ms: 3000,
            reason: Some(format!("Set lights scene to '{scene}'.")),
            confidence: 0.86,
        });
    }

    if ["pause music", "stop music", "music off"].iter().any(|p| text.contains(p)) {
        actions.push(media_action(
            "action_music_pause",
            "music_pause",
            "User requested music pause.",
            0.91,
        ));
    }

    if ["resume music", "play music", "music on"].iter().any(|p| text.contains(p)) {
        actions.push(media_action(
            "action_music_resume",
            "music_resume",
            "User requested music resume.",
            0.9,
        ));
    }

    if ["next track", "music next", "skip song", "skip track"].iter().any(|p| text.contains(p)) {
        actions.push(media_action(
            "action_music_next",
            "music_next",
            "Advance music track.",
            0.82,
        ));
    }

    actions.truncate(max_actions);
    actions
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Proposal assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn retrieval_info(expert: &ExpertProfile) -> Value {
    json!({
        "citation_ids": [],
        "confidence": 0.4,
        "expert_id": expert.expert_id,
        "allow_actions": expert.allow_actions,
        "retrieval_domains": expert.retrieval_domains,
    })
}

/// Build the deterministic fallback proposal for an assist request.
pub fn build_fallback_proposal(
    request: &FallbackRequest,
    expert: &ExpertProfile,
    timestamp_utc: &str,
) -> IntentProposal {
    let user_text = request.user_text.trim().to_owned();
    let max_actions = request.max_actions.min(wd_domain::intent::MAX_ACTIONS);
    let actions = stub_actions(&user_text, max_actions, expert.allow_actions);
    let needs_tools = !actions.is_empty();
    let response_text = if needs_tools {
        "I prepared actions based on your request.".to_owned()
    } else {
        "I can help with that. I did not propose any direct tool actions.".to_owned()
    };

    IntentProposal {
        schema_version: "1.0".into(),
        request_id: request
            .request_id
            .clone()
            .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4().simple())),
        session_id: request.session_id.clone(),
        timestamp_utc: timestamp_utc.to_owned(),
        mode: request.mode,
        domain: request.domain.unwrap_or_else(|| infer_domain(&user_text)),
        urgency: request.urgency.unwrap_or_else(|| infer_urgency(&user_text)),
        user_text,
        needs_tools,
        needs_clarification: false,
        clarification_questions: Vec::new(),
        retrieval: Some(retrieval_info(expert)),
        proposed_actions: actions,
        response_text,
    }
}

/// The prompt handed to the planner.
pub fn build_prompt(request: &FallbackRequest, expert: &ExpertProfile) -> String {
    let system = "You are a voice co-pilot planner. Propose tool actions only \
                  when the request clearly asks for one.";
    let lines = [
        system.to_owned(),
        format!("Expert: {}", expert.expert_id),
        format!("AllowActions: {}", expert.allow_actions),
        format!("RetrievalDomains: {}", expert.retrieval_domains.join(",")),
        format!("Mode: {}", request.mode.as_str()),
        format!("UserRequest: {}", request.user_text.trim()),
        "Return JSON only with the intent proposal schema.".to_owned(),
    ];
    lines.join("\n")
}

/// Turn any fallback proposal into the safe, clarification-only shape:
/// no tools, no actions, and the validation failure recorded (truncated)
/// in `retrieval.llm_validation_error`. Re-validates before returning.
pub fn safe_no_action(fallback: &IntentProposal, reason: &str) -> Result<IntentProposal> {
    let mut proposal = fallback.clone();
    proposal.needs_tools = false;
    proposal.needs_clarification = true;
    proposal.clarification_questions =
        vec!["Please confirm the exact action you want me to take.".to_owned()];
    proposal.proposed_actions = Vec::new();
    proposal.response_text = "I need clarification before taking any action.".to_owned();

    let mut retrieval = match proposal.retrieval.take() {
        Some(Value::Object(map)) => map,
        _ => {
            let mut map = serde_json::Map::new();
            map.insert("citation_ids".into(), json!([]));
            map.insert("confidence".into(), json!(0.0));
            map
        }
    };
    let truncated: String = reason.chars().take(MAX_ERROR_CHARS).collect();
    retrieval.insert("llm_validation_error".into(), json!(truncated));
    proposal.retrieval = Some(Value::Object(retrieval));

    proposal.validate()?;
    Ok(proposal)
}
