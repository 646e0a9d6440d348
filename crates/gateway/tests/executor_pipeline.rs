//! End-to-end executor coverage: gates, confirmation flow, terminal states,
//! idempotence, and the audit trail, all against in-memory SQLite and the
//! bundled Standing Orders document.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tempfile::NamedTempFile;

use wd_advisory::AdvisoryClient;
use wd_domain::config::{AdvisoryConfig, Config};
use wd_domain::error::{Error, Result};
use wd_domain::intent::IntentProposal;
use wd_domain::requests::ExecuteRequest;
use wd_domain::time::ManualClock;
use wd_gateway::runtime::actuators::ToolDispatcher;
use wd_gateway::runtime::executor::execute_actions;
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
        tool_name: &str,
        _parameters: &Map<String, Value>,
        _request_id: &str,
        action_id: &str,
        dry_run: bool,
    ) -> Result<Value> {
        Ok(json!({
            "stub_execution": true,
            "dry_run": dry_run,
            "tool_name": tool_name,
            "action_id": action_id,
            "result": "Dry run only. No actuator call executed.",
        }))
    }
}

struct FailingDispatcher;

#[async_trait]
impl ToolDispatcher for FailingDispatcher {
    async fn execute(
        &self,
        _tool_name: &str,
        _parameters: &Map<String, Value>,
        _request_id: &str,
        _action_id: &str,
        _dry_run: bool,
    ) -> Result<Value> {
        Err(Error::Http("lights webhook unreachable".into()))
    }
}

struct SlowDispatcher;

#[async_trait]
impl ToolDispatcher for SlowDispatcher {
    async fn execute(
        &self,
        _tool_name: &str,
        _parameters: &Map<String, Value>,
        _request_id: &str,
        _action_id: &str,
        _dry_run: bool,
    ) -> Result<Value> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(json!({"result": "too late"}))
    }
}

struct Harness {
    state: AppState,
    clock: Arc<ManualClock>,
    _orders: NamedTempFile,
}

fn harness_with(dispatcher: Arc<dyn ToolDispatcher>, foreground: Option<&str>) -> Harness {
    let mut orders = NamedTempFile::new().unwrap();
    orders.write_all(BUNDLED_ORDERS.as_bytes()).unwrap();
    orders.flush().unwrap();

    let logbook = Arc::new(Logbook::open_in_memory().unwrap());
    let policy = Arc::new(PolicyEngine::load(orders.path()).unwrap());
    let router = Arc::new(ToolRouter::new(
        policy.clone(),
        Some(logbook.clone() as Arc<dyn wd_domain::event::EventSink>),
    ));
    let clock = Arc::new(ManualClock::at(BASE_TS));
    let advisory = Arc::new(AdvisoryClient::new(&AdvisoryConfig::default()));

    let state = AppState {
        config: Arc::new(Config::default()),
        logbook,
        policy,
        router,
        advisory,
        dispatcher,
        foreground: Arc::new(StaticForeground(foreground.map(str::to_owned))),
        clock: clock.clone(),
    };
    Harness {
        state,
        clock,
        _orders: orders,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(StubDispatcher), Some("EliteDangerous64.exe"))
}

fn intent_with_actions(request_id: &str, actions: Value) -> IntentProposal {
    serde_json::from_value(json!({
        "schema_version": "1.0",
        "request_id": request_id,
        "session_id": "sess-exec",
        "timestamp_utc": "2023-11-14T22:13:20Z",
        "mode": "game",
        "domain": "gameplay",
        "urgency": "normal",
        "user_text": "run the queued actions",
        "needs_tools": true,
        "needs_clarification": false,
        "proposed_actions": actions,
        "response_text": "Understood."
    }))
    .unwrap()
}

fn lights_action(action_id: &str) -> Value {
    json!({
        "action_id": action_id,
        "tool_name": "set_lights",
        "parameters": {"scene": "combat"},
        "safety_level": "low_risk",
        "mode_constraints": ["game", "standby"],
        "requires_confirmation": false,
        "timeout_ms": 3000,
        "confidence": 0.9
    })
}

fn seed_intent(harness: &Harness, request_id: &str, actions: Value) {
    let intent = intent_with_actions(request_id, actions);
    harness
        .state
        .logbook
        .upsert_intent(&intent, "test", "2023-11-14T22:13:20.000000Z")
        .unwrap();
}

fn execute_request(request_id: &str) -> ExecuteRequest {
    serde_json::from_value(json!({
        "request_id": request_id,
        "incident_id": "inc-exec",
        "watch_condition": "GAME",
    }))
    .unwrap()
}

fn event_types(harness: &Harness, correlation_id: &str) -> Vec<String> {
    let mut events = harness
        .state
        .logbook
        .list_events(&EventQuery {
            correlation_id: Some(correlation_id.into()),
            ..EventQuery::default()
        })
        .unwrap();
    events.reverse();
    events.into_iter().map(|e| e.event_type).collect()
}

// ── Success path ─────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_success_with_full_audit_trail() {
    let harness = harness();
    seed_intent(&harness, "req-ok", json!([lights_action("a1")]));

    let response = execute_actions(&harness.state, &execute_request("req-ok"), "test")
        .await
        .unwrap();

    assert_eq!(response.watch_condition, "GAME");
    assert!(response.dry_run);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].status, "success");
    assert!(response.results[0].output.is_some());

    let actions = harness.state.logbook.list_actions("req-ok", None).unwrap();
    assert_eq!(actions[0].status, "success");

    let types = event_types(&harness, "req-ok");
    let expected = [
        "INTENT_PROPOSED",
        "POLICY_DECISION",
        "ACTION_APPROVED",
        "TOOL_EXECUTE_RESULT",
        "ACTION_EXECUTED",
    ];
    assert_eq!(types, expected, "got: {types:?}");
}

#[tokio::test]
async fn second_execute_reports_already_finalized() {
    let harness = harness();
    seed_intent(&harness, "req-idem", json!([lights_action("a1")]));

    let first = execute_actions(&harness.state, &execute_request("req-idem"), "test")
        .await
        .unwrap();
    assert_eq!(first.results[0].status, "success");

    let second = execute_actions(&harness.state, &execute_request("req-idem"), "test")
        .await
        .unwrap();
    assert_eq!(second.results[0].status, "success");
    assert_eq!(second.results[0].message.as_deref(), Some("already finalized"));

    // No new terminal events for the second pass.
    let types = event_types(&harness, "req-idem");
    assert_eq!(types.iter().filter(|t| *t == "ACTION_EXECUTED").count(), 1);
}

// ── Gates ────────────────────────────────────────────────────────────

#[tokio::test]
async fn mode_constraint_denies_before_policy() {
    let harness = harness();
    // The intent runs in game mode; the action only permits work mode.
    seed_intent(
        &harness,
        "req-mode",
        json!([{
            "action_id": "a1",
            "tool_name": "set_lights",
            "parameters": {"scene": "combat"},
            "safety_level": "low_risk",
            "mode_constraints": ["work"],
            "timeout_ms": 3000,
            "confidence": 0.9
        }]),
    );

    let response = execute_actions(&harness.state, &execute_request("req-mode"), "test")
        .await
        .unwrap();
    assert_eq!(response.results[0].status, "denied");
    assert_eq!(
        response.results[0].reason_code.as_deref(),
        Some("DENY_MODE_CONSTRAINT")
    );
    let actions = harness.state.logbook.list_actions("req-mode", None).unwrap();
    assert_eq!(actions[0].status, "denied");
}

#[tokio::test]
async fn high_risk_requires_explicit_opt_in() {
    let harness = harness();
    let keypress = json!({
        "action_id": "a1",
        "tool_name": "keypress",
        "parameters": {"key": "space"},
        "safety_level": "high_risk",
        "mode_constraints": ["game"],
        "requires_confirmation": false,
        "timeout_ms": 800,
        "confidence": 0.9
    });
    seed_intent(&harness, "req-risk", json!([keypress]));

    let denied = execute_actions(&harness.state, &execute_request("req-risk"), "test")
        .await
        .unwrap();
    assert_eq!(denied.results[0].status, "denied");
    assert_eq!(
        denied.results[0].reason_code.as_deref(),
        Some("DENY_HIGH_RISK_NOT_ALLOWED")
    );
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let harness = harness();
    let err = execute_actions(&harness.state, &execute_request("req-ghost"), "test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ── Confirmation flow ────────────────────────────────────────────────

fn twitch_action() -> Value {
    json!({
        "action_id": "a1",
        "tool_name": "twitch.redeem",
        "parameters": {"redeem": "hull-seal"},
        "safety_level": "low_risk",
        "mode_constraints": ["game"],
        "requires_confirmation": false,
        "timeout_ms": 2000,
        "confidence": 0.9
    })
}

#[tokio::test]
async fn gated_tool_stays_queued_until_confirmed() {
    let harness = harness();
    seed_intent(&harness, "req-confirm", json!([twitch_action()]));

    let first = execute_actions(&harness.state, &execute_request("req-confirm"), "test")
        .await
        .unwrap();
    let outcome = &first.results[0];
    assert_eq!(outcome.status, "requires_confirmation");
    assert_eq!(outcome.reason_code.as_deref(), Some("DENY_NEEDS_CONFIRMATION"));
    let token = outcome.confirm_token.clone().expect("confirm token");
    assert!(!token.is_empty());

    // The row is still queued, stamped with the deny code.
    let actions = harness.state.logbook.list_actions("req-confirm", None).unwrap();
    assert_eq!(actions[0].status, "queued");

    let types = event_types(&harness, "req-confirm");
    assert!(types.contains(&"ACTION_CONFIRMATION_REQUIRED".to_owned()));

    // Confirm and execute again within the window.
    harness.clock.advance(2.0);
    let confirmed: ExecuteRequest = serde_json::from_value(json!({
        "request_id": "req-confirm",
        "incident_id": "inc-exec",
        "watch_condition": "GAME",
        "user_confirmed": true,
        "user_confirm_token": token,
    }))
    .unwrap();
    let second = execute_actions(&harness.state, &confirmed, "test")
        .await
        .unwrap();
    assert_eq!(second.results[0].status, "success", "got: {:?}", second.results[0]);
}

#[tokio::test]
async fn expired_confirmation_replay_is_rejected() {
    let harness = harness();
    seed_intent(&harness, "req-expired", json!([twitch_action()]));

    // A confirmation stamped years ago replayed against a live request.
    let stale: ExecuteRequest = serde_json::from_value(json!({
        "request_id": "req-expired",
        "incident_id": "inc-exec",
        "watch_condition": "GAME",
        "user_confirmed": true,
        "confirmed_at_utc": "2020-01-01T00:00:00Z",
    }))
    .unwrap();
    let response = execute_actions(&harness.state, &stale, "test").await.unwrap();
    let outcome = &response.results[0];
    assert_eq!(outcome.status, "requires_confirmation");
    assert_eq!(
        outcome.reason_code.as_deref(),
        Some("DENY_CONFIRMATION_EXPIRED")
    );

    let types = event_types(&harness, "req-expired");
    assert!(types.contains(&"ACTION_CONFIRMATION_EXPIRED".to_owned()));
    assert!(!types.contains(&"ACTION_CONFIRMATION_REQUIRED".to_owned()));
}

// ── Failure paths ────────────────────────────────────────────────────

#[tokio::test]
async fn dispatcher_failure_lands_in_error() {
    let harness = harness_with(Arc::new(FailingDispatcher), Some("EliteDangerous64.exe"));
    seed_intent(&harness, "req-fail", json!([lights_action("a1")]));

    let live: ExecuteRequest = serde_json::from_value(json!({
        "request_id": "req-fail",
        "incident_id": "inc-exec",
        "watch_condition": "GAME",
        "dry_run": false,
    }))
    .unwrap();
    let response = execute_actions(&harness.state, &live, "test").await.unwrap();
    let outcome = &response.results[0];
    assert_eq!(outcome.status, "error");
    assert_eq!(outcome.error_code.as_deref(), Some("execution_error"));
    assert!(outcome.error.as_deref().unwrap().contains("webhook"));

    let actions = harness.state.logbook.list_actions("req-fail", None).unwrap();
    assert_eq!(actions[0].status, "error");
    let types = event_types(&harness, "req-fail");
    assert!(types.contains(&"ACTION_FAILED".to_owned()));
}

#[tokio::test]
async fn slow_dispatcher_times_out() {
    let harness = harness_with(Arc::new(SlowDispatcher), Some("EliteDangerous64.exe"));
    let mut action = lights_action("a1");
    action["timeout_ms"] = json!(100);
    seed_intent(&harness, "req-slow", json!([action]));

    let response = execute_actions(&harness.state, &execute_request("req-slow"), "test")
        .await
        .unwrap();
    let outcome = &response.results[0];
    assert_eq!(outcome.status, "timeout");
    assert_eq!(outcome.error_code.as_deref(), Some("timeout"));

    let actions = harness.state.logbook.list_actions("req-slow", None).unwrap();
    assert_eq!(actions[0].status, "timeout");
}

// ── Multi-action ordering ────────────────────────────────────────────

#[tokio::test]
async fn actions_run_in_insertion_order() {
    let harness = harness();
    seed_intent(
        &harness,
        "req-multi",
        json!([lights_action("a1"), lights_action("a2"), twitch_action_with_id("a3")]),
    );

    let response = execute_actions(&harness.state, &execute_request("req-multi"), "test")
        .await
        .unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.action_id.as_str()).collect();
    assert_eq!(ids, ["a1", "a2", "a3"]);
    assert_eq!(response.results[0].status, "success");
    assert_eq!(response.results[1].status, "success");
    assert_eq!(response.results[2].status, "requires_confirmation");
}

fn twitch_action_with_id(action_id: &str) -> Value {
    let mut action = twitch_action();
    action["action_id"] = json!(action_id);
    action
}

// ── Watch-condition resolution ───────────────────────────────────────

#[tokio::test]
async fn watch_condition_falls_back_to_intent_mode() {
    let harness = harness();
    seed_intent(&harness, "req-wc", json!([lights_action("a1")]));

    let request: ExecuteRequest = serde_json::from_value(json!({
        "request_id": "req-wc",
        "incident_id": "inc-exec",
    }))
    .unwrap();
    let response = execute_actions(&harness.state, &request, "test").await.unwrap();
    // Intent mode is game, so the resolved condition is GAME.
    assert_eq!(response.watch_condition, "GAME");
    assert_eq!(response.results[0].status, "success");
}
