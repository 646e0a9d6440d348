//! Assist orchestration coverage: the ordered `ASSIST_*` audit chain, the
//! dry policy preview, and the safe fallback on malformed planner output.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tempfile::NamedTempFile;

use wd_advisory::{AdvisoryClient, Contract};
use wd_domain::config::Config;
use wd_domain::error::Result;
use wd_domain::requests::AssistRequest;
use wd_domain::time::ManualClock;
use wd_gateway::runtime::actuators::ToolDispatcher;
use wd_gateway::runtime::assist::handle_assist;
use wd_gateway::runtime::foreground::StaticForeground;
use wd_gateway::state::AppState;
use wd_logbook::{EventQuery, Logbook};
use wd_policy::{PolicyEngine, ToolRouter};

const BUNDLED_ORDERS: &str = include_str!("../../../config/standing_orders.json");

const BASE_TS: f64 = 1_700_000_000.0;

struct StubDispatcher;

#[async_trait]
impl ToolDispatcher for StubDispatcher {
    async fn execute(
        &self,
        _tool_name: &str,
        _parameters: &Map<String, Value>,
        _request_id: &str,
        _action_id: &str,
        _dry_run: bool,
    ) -> Result<Value> {
        Ok(json!({"result": "stub"}))
    }
}

fn bundled_contract() -> Contract {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../contracts/intent_proposal.json");
    Contract::load(&path)
}

fn harness(advisory: AdvisoryClient) -> (AppState, NamedTempFile) {
    let mut orders = NamedTempFile::new().unwrap();
    orders.write_all(BUNDLED_ORDERS.as_bytes()).unwrap();
    orders.flush().unwrap();

    let logbook = Arc::new(Logbook::open_in_memory().unwrap());
    let policy = Arc::new(PolicyEngine::load(orders.path()).unwrap());
    let router = Arc::new(ToolRouter::new(
        policy.clone(),
        Some(logbook.clone() as Arc<dyn wd_domain::event::EventSink>),
    ));

    let state = AppState {
        config: Arc::new(Config::default()),
        logbook,
        policy,
        router,
        advisory: Arc::new(advisory),
        dispatcher: Arc::new(StubDispatcher),
        foreground: Arc::new(StaticForeground(Some("EliteDangerous64.exe".into()))),
        clock: Arc::new(ManualClock::at(BASE_TS)),
    };
    (state, orders)
}

/// Advisory client that echoes whatever the orchestrator's fallback builder
/// produced, like the stub planner mode does.
fn echoing_advisory() -> AdvisoryClient {
    let config = wd_domain::config::AdvisoryConfig {
        mode: "stub".into(),
        contract_path: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../contracts/intent_proposal.json"),
        ..wd_domain::config::AdvisoryConfig::default()
    };
    AdvisoryClient::new(&config)
}

fn garbage_advisory() -> AdvisoryClient {
    AdvisoryClient::with_generator(
        bundled_contract(),
        Box::new(|_| Ok("this is not valid json".to_owned())),
    )
}

fn assist_request(user_text: &str, mode: &str) -> AssistRequest {
    serde_json::from_value(json!({
        "user_text": user_text,
        "mode": mode,
        "incident_id": "inc-assist",
        "stt_confidence": 0.95,
    }))
    .unwrap()
}

fn correlated_event_types(state: &AppState, request_id: &str) -> Vec<String> {
    let mut events = state
        .logbook
        .list_events(&EventQuery {
            correlation_id: Some(request_id.into()),
            ..EventQuery::default()
        })
        .unwrap();
    events.reverse();
    events.into_iter().map(|e| e.event_type).collect()
}

fn assert_subsequence(haystack: &[String], needles: &[&str]) {
    let mut iter = haystack.iter();
    for needle in needles {
        assert!(
            iter.any(|t| t == needle),
            "missing {needle} in order within {haystack:?}"
        );
    }
}

#[tokio::test]
async fn successful_chain_emits_ordered_audit_events() {
    let (state, _orders) = harness(echoing_advisory());
    let response = handle_assist(&state, &assist_request("set the lights to combat", "game"), "assist")
        .await
        .unwrap();

    assert!(response.ok);
    assert!(response.proposal.needs_tools);
    assert_eq!(response.policy_preview.len(), 1);
    assert!(response.policy_preview[0].allowed);
    assert_eq!(response.meta.validation, "ok");

    let types = correlated_event_types(&state, &response.request_id);
    assert_subsequence(
        &types,
        &[
            "ASSIST_REQUEST_SUMMARY",
            "ASSIST_PROPOSAL_RECEIVED",
            "ASSIST_PROPOSAL_VALIDATED",
            "ASSIST_POLICY_PREVIEW",
            "ASSIST_PROPOSAL",
        ],
    );
    // The persisted intent and the per-action policy decision share the
    // same correlation id.
    assert!(types.contains(&"INTENT_PROPOSED".to_owned()));
    assert!(types.contains(&"POLICY_DECISION".to_owned()));
}

#[tokio::test]
async fn confirmation_gated_action_issues_token() {
    let (state, _orders) = harness(echoing_advisory());
    let response = handle_assist(&state, &assist_request("press space please", "game"), "assist")
        .await
        .unwrap();

    let preview = &response.policy_preview[0];
    assert_eq!(preview.tool_key, "input.keypress");
    assert!(preview.requires_confirmation);
    assert_eq!(preview.reason_code, "DENY_NEEDS_CONFIRMATION");
    let token = preview.confirm_token.as_deref().expect("confirm token");
    assert!(token.starts_with("confirm-inc-assist-"));

    let types = correlated_event_types(&state, &response.request_id);
    assert!(types.contains(&"ASSIST_CONFIRM_ISSUED".to_owned()));

    // The queued action is still queued; the preview pass never mutates it.
    let actions = state.logbook.list_actions(&response.request_id, None).unwrap();
    assert_eq!(actions[0].status, "queued");
}

#[tokio::test]
async fn garbage_planner_output_surfaces_safe_fallback() {
    let (state, _orders) = harness(garbage_advisory());
    let response = handle_assist(&state, &assist_request("set the lights to combat", "game"), "assist")
        .await
        .unwrap();

    assert_eq!(response.meta.validation, "safe_fallback");
    assert!(!response.proposal.needs_tools);
    assert!(response.proposal.needs_clarification);
    assert!(response.proposal.proposed_actions.is_empty());
    assert!(response.policy_preview.is_empty());
    let retrieval = response.proposal.retrieval.as_ref().unwrap();
    assert_eq!(retrieval["llm_validation_error"], "invalid_json");

    let types = correlated_event_types(&state, &response.request_id);
    assert_subsequence(
        &types,
        &["ASSIST_REQUEST_SUMMARY", "ASSIST_PROPOSAL_INVALID", "ASSIST_PROPOSAL"],
    );
    assert!(!types.contains(&"ASSIST_PROPOSAL_VALIDATED".to_owned()));

    // The safe fallback is still persisted for the record.
    assert!(state.logbook.get_intent(&response.request_id).unwrap().is_some());
}

#[tokio::test]
async fn lore_domain_never_previews_keypress() {
    let (state, _orders) = harness(echoing_advisory());
    let request: AssistRequest = serde_json::from_value(json!({
        "user_text": "press space and tell me guardian lore",
        "mode": "game",
        "domain": "lore",
        "incident_id": "inc-lore",
    }))
    .unwrap();
    let response = handle_assist(&state, &request, "assist").await.unwrap();

    // The lore expert is advisory-only: its proposals carry no actions.
    assert!(response.proposal.proposed_actions.is_empty());
    assert!(!response.proposal.needs_tools);
    assert!(response.policy_preview.is_empty());
}

#[tokio::test]
async fn watch_condition_override_applies_to_preview() {
    let (state, _orders) = harness(echoing_advisory());
    let request: AssistRequest = serde_json::from_value(json!({
        "user_text": "set the lights to combat",
        "mode": "game",
        "watch_condition": "DEGRADED",
        "incident_id": "inc-degraded",
    }))
    .unwrap();
    let response = handle_assist(&state, &request, "assist").await.unwrap();

    assert_eq!(response.watch_condition, "DEGRADED");
    let preview = &response.policy_preview[0];
    assert!(!preview.allowed);
    assert_eq!(preview.reason_code, "DENY_EXPLICITLY_DENIED");
}
