//! Router-level gating: token derivation, the action-metadata confirmation
//! gate, and decision logging.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use wd_domain::event::{EventRecord, EventSink};
use wd_policy::engine::PolicyEngine;
use wd_policy::router::{RouteContext, ToolRouter};
use wd_policy::types::ReasonCode;

const BUNDLED_ORDERS: &str = include_str!("../../../config/standing_orders.json");

const BASE_TS: f64 = 1_700_000_000.0;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EventRecord>>,
}

impl EventSink for RecordingSink {
    fn append_event(&self, event: EventRecord) {
        self.events.lock().push(event);
    }
}

fn router() -> (ToolRouter, Arc<RecordingSink>, NamedTempFile) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(BUNDLED_ORDERS.as_bytes()).unwrap();
    file.flush().unwrap();
    let engine = Arc::new(PolicyEngine::load(file.path()).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let router = ToolRouter::new(engine, Some(sink.clone() as Arc<dyn EventSink>));
    (router, sink, file)
}

fn ctx(tool: &str) -> RouteContext {
    RouteContext {
        incident_id: "inc-route".into(),
        watch_condition: "GAME".into(),
        tool_name: tool.into(),
        source: "test".into(),
        stt_confidence: Some(0.95),
        foreground_process: Some("EliteDangerous64.exe".into()),
        now_ts: BASE_TS,
        ..RouteContext::default()
    }
}

#[test]
fn metadata_gate_overrides_policy_allow() {
    let (router, _sink, _file) = router();
    let routed = router
        .evaluate_action(RouteContext {
            action_requires_confirmation: true,
            ..ctx("input.keypress")
        })
        .unwrap();

    assert!(!routed.decision.allowed);
    assert!(routed.decision.requires_confirmation);
    assert_eq!(
        routed.decision.deny_reason_code,
        ReasonCode::DenyNeedsConfirmation
    );
    let token = routed.confirm_token.expect("confirm token");
    assert_eq!(token, "confirm-inc-route-input-keypress");
    assert_eq!(routed.decision.constraints.confirm_token.as_deref(), Some(token.as_str()));
    assert!(routed.decision.constraints.confirm_by_ts.unwrap() > BASE_TS);
}

#[test]
fn user_confirmed_clears_metadata_gate() {
    let (router, _sink, _file) = router();
    let routed = router
        .evaluate_action(RouteContext {
            action_requires_confirmation: true,
            user_confirmed: true,
            ..ctx("input.keypress")
        })
        .unwrap();
    assert!(routed.decision.allowed, "got: {:?}", routed.decision);
    assert!(routed.confirm_token.is_none());
}

#[test]
fn user_confirmation_is_recorded_for_gated_tools() {
    let (router, _sink, _file) = router();
    // twitch.* always requires confirmation in GAME; confirming in the same
    // call records the grant and the evaluation passes.
    let routed = router
        .evaluate_action(RouteContext {
            user_confirmed: true,
            ..ctx("twitch.redeem")
        })
        .unwrap();
    assert!(routed.decision.allowed, "got: {:?}", routed.decision);
    assert_eq!(routed.tool_key, "twitch.redeem");
}

#[test]
fn stale_confirmation_ts_yields_expired() {
    let (router, _sink, _file) = router();
    let routed = router
        .evaluate_action(RouteContext {
            user_confirmed: true,
            confirmation_ts: Some(BASE_TS - 300.0),
            ..ctx("twitch.redeem")
        })
        .unwrap();
    assert!(!routed.decision.allowed);
    assert!(routed.decision.requires_confirmation);
    assert_eq!(
        routed.decision.deny_reason_code,
        ReasonCode::DenyConfirmationExpired
    );
    assert!(routed.confirm_token.is_some());
}

#[test]
fn supplied_token_is_used_verbatim() {
    let (router, _sink, _file) = router();
    let routed = router
        .evaluate_action(RouteContext {
            user_confirm_token: Some("tok-custom".into()),
            ..ctx("twitch.redeem")
        })
        .unwrap();
    assert_eq!(routed.confirm_token.as_deref(), Some("tok-custom"));
}

#[test]
fn every_evaluation_logs_a_policy_decision() {
    let (router, sink, _file) = router();
    router.evaluate_action(ctx("input.keypress")).unwrap();
    router
        .evaluate_action(RouteContext {
            watch_condition: "WORK".into(),
            ..ctx("input.keypress")
        })
        .unwrap();

    let events = sink.events.lock();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == "POLICY_DECISION"));
    // The deny is logged at warn severity.
    assert_eq!(events[1].severity, wd_domain::event::Severity::Warn);
    assert_eq!(events[1].correlation_id.as_deref(), Some("inc-route"));
}

#[test]
fn request_id_wins_as_correlation_id() {
    let (router, sink, _file) = router();
    router
        .evaluate_action(RouteContext {
            request_id: Some("req-77".into()),
            ..ctx("input.keypress")
        })
        .unwrap();
    let events = sink.events.lock();
    assert_eq!(events[0].correlation_id.as_deref(), Some("req-77"));
}
