//! HTTP surface behavior: status codes, error envelopes, and the
//! confirm → execute round trip over the wire.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Map, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use wd_advisory::AdvisoryClient;
use wd_domain::config::{AdvisoryConfig, Config};
use wd_domain::error::Result;
use wd_domain::time::SystemClock;
use wd_gateway::api;
use wd_gateway::runtime::actuators::ToolDispatcher;
use wd_gateway::runtime::foreground::StaticForeground;
use wd_gateway::state::AppState;
use wd_logbook::Logbook;
use wd_policy::{PolicyEngine, ToolRouter};

const BUNDLED_ORDERS: &str = include_str!("../../../config/standing_orders.json");

struct StubDispatcher;

#[async_trait]
impl ToolDispatcher for StubDispatcher {
    async fn execute(
        &self,
        tool_name: &str,
        _parameters: &Map<String, Value>,
        _request_id: &str,
        _action_id: &str,
        dry_run: bool,
    ) -> Result<Value> {
        Ok(json!({"tool_name": tool_name, "dry_run": dry_run, "result": "stub"}))
    }
}

fn app() -> (Router, NamedTempFile) {
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
        advisory: Arc::new(AdvisoryClient::new(&AdvisoryConfig::default())),
        dispatcher: Arc::new(StubDispatcher),
        foreground: Arc::new(StaticForeground(Some("EliteDangerous64.exe".into()))),
        clock: Arc::new(SystemClock),
    };
    (api::router().with_state(state), orders)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn sample_intent(request_id: &str) -> Value {
    json!({
        "schema_version": "1.0",
        "request_id": request_id,
        "timestamp_utc": "2024-05-01T10:00:00Z",
        "mode": "game",
        "domain": "gameplay",
        "urgency": "normal",
        "user_text": "redeem the channel points",
        "needs_tools": true,
        "needs_clarification": false,
        "proposed_actions": [{
            "action_id": "a1",
            "tool_name": "twitch.redeem",
            "parameters": {"redeem": "hull-seal"},
            "safety_level": "low_risk",
            "mode_constraints": ["game"],
            "requires_confirmation": false,
            "timeout_ms": 2000,
            "confidence": 0.9
        }],
        "response_text": "Understood."
    })
}

#[tokio::test]
async fn health_is_public_and_ok() {
    let (app, _orders) = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["service"], json!("watchdeck"));
}

#[tokio::test]
async fn unknown_route_is_404_with_envelope() {
    let (app, _orders) = app();
    let (status, body) = call(&app, "GET", "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"ok": false, "error": "not_found"}));
}

#[tokio::test]
async fn intent_with_unknown_key_is_400() {
    let (app, _orders) = app();
    let mut intent = sample_intent("req-http-1");
    intent["surprise"] = json!(true);
    let (status, body) = call(&app, "POST", "/intent", Some(intent)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("surprise"));
}

#[tokio::test]
async fn execute_unknown_request_is_404() {
    let (app, _orders) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/execute",
        Some(json!({"request_id": "req-ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn feedback_unknown_request_is_404_and_bad_rating_400() {
    let (app, _orders) = app();
    let (status, _) = call(
        &app,
        "POST",
        "/feedback",
        Some(json!({"request_id": "req-ghost", "rating": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        "POST",
        "/feedback",
        Some(json!({"request_id": "req-ghost", "rating": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("rating"));
}

#[tokio::test]
async fn state_rejects_bad_prefix_and_round_trips_good_items() {
    let (app, _orders) = app();

    let (status, body) = call(
        &app,
        "POST",
        "/state",
        Some(json!({"items": [{
            "state_key": "weather.outside",
            "state_value": "raining",
            "source": "probe"
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("prefixes"));

    let (status, body) = call(
        &app,
        "POST",
        "/state",
        Some(json!({"items": [{
            "state_key": "ed.running",
            "state_value": true,
            "source": "probe"
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upserted"], json!(1));
    assert_eq!(body["changed"], json!(1));

    let (status, body) = call(&app, "GET", "/state?key=ed.running", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["items"][0]["state_value"], json!(true));
}

#[tokio::test]
async fn confirm_then_execute_round_trip() {
    let (app, _orders) = app();

    let (status, body) = call(&app, "POST", "/intent", Some(sample_intent("req-http-rt"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued_actions"], json!(1));

    // First execute: the gated tool demands confirmation.
    let (status, body) = call(
        &app,
        "POST",
        "/execute",
        Some(json!({
            "request_id": "req-http-rt",
            "incident_id": "inc-http",
            "watch_condition": "GAME",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["status"], json!("requires_confirmation"));
    let token = body["results"][0]["confirm_token"].as_str().unwrap().to_owned();

    // Record the confirmation, then execute again with the token.
    let (status, body) = call(
        &app,
        "POST",
        "/confirm",
        Some(json!({
            "incident_id": "inc-http",
            "tool_name": "twitch.redeem",
            "user_confirm_token": token.as_str(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tool_name"], json!("twitch.redeem"));

    let (status, body) = call(
        &app,
        "POST",
        "/execute",
        Some(json!({
            "request_id": "req-http-rt",
            "incident_id": "inc-http",
            "watch_condition": "GAME",
            "user_confirm_token": token.as_str(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["status"], json!("success"), "body: {body}");

    // Feedback now lands too.
    let (status, _) = call(
        &app,
        "POST",
        "/feedback",
        Some(json!({"request_id": "req-http-rt", "rating": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The audit chain is queryable by correlation id.
    let (status, body) = call(
        &app,
        "GET",
        "/events?correlation_id=req-http-rt&limit=100",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"ACTION_CONFIRMATION_REQUIRED"));
    assert!(types.contains(&"ACTION_EXECUTED"));
    assert!(types.contains(&"USER_FEEDBACK"));
}
