//! Watch-condition supervisor.
//!
//! Derives the current operational condition from observed state at a low
//! fixed cadence, publishes it to the state map, and on every transition
//! emits `WATCH_CONDITION_CHANGED` plus a `HANDOVER_NOTE` snapshot sharing
//! one correlation id.

use serde_json::{json, Value};

use wd_domain::config::Config;
use wd_domain::event::{EventRecord, Severity};
use wd_logbook::{Logbook, StateWrite};

use crate::state::AppState;

const SOURCE: &str = "watch_condition_supervisor";

/// Memory pressure above which the handover note raises an alarm.
const MEMORY_ALARM_PERCENT: f64 = 90.0;

fn state_truthy(logbook: &Logbook, key: &str) -> bool {
    matches!(logbook.get_state(key), Ok(Some(row)) if row.is_truthy())
}

/// Derive the current watch condition from observed state.
///
/// The environment override wins outright; degraded and restricted flags
/// outrank everything the probes report.
pub fn derive_watch_condition(config: &Config, logbook: &Logbook) -> String {
    if let Some(forced) = &config.supervisor.force_watch_condition {
        return forced.to_uppercase();
    }
    if state_truthy(logbook, "system.degraded") {
        return "DEGRADED".into();
    }
    if state_truthy(logbook, "system.restricted_mode") {
        return "RESTRICTED".into();
    }
    if state_truthy(logbook, "ed.running") {
        return "GAME".into();
    }
    "STANDBY".into()
}

/// Snapshot of alarms, equipment presence, aux-app state, and AI
/// availability for the handover note.
pub fn handover_snapshot(logbook: &Logbook) -> Value {
    let get = |key: &str| logbook.get_state(key).ok().flatten();

    let hardware_mem = get("hw.memory_used_percent");
    let ed_running = get("ed.running");
    let ed_system = get("ed.telemetry.system_name");
    let music_playing = get("music.playing");
    let music_title = get("music.track.title");
    let music_artist = get("music.track.artist");
    let ai_local = get("ai.local.available");
    let ai_cloud = get("ai.cloud.available");
    let ai_degraded = get("ai.degraded");

    let mut alarms: Vec<&str> = Vec::new();
    if let Some(row) = &hardware_mem {
        if row
            .state_value
            .as_f64()
            .map(|v| v >= MEMORY_ALARM_PERCENT)
            .unwrap_or(false)
        {
            alarms.push("hw.memory_used_percent_high");
        }
    }

    let ai_status = if ai_degraded.as_ref().map(|r| r.is_truthy()).unwrap_or(false) {
        "degraded"
    } else {
        let local_on = ai_local.as_ref().map(|r| r.is_truthy()).unwrap_or(false);
        let cloud_on = ai_cloud.as_ref().map(|r| r.is_truthy()).unwrap_or(false);
        match (local_on, cloud_on) {
            (true, true) => "local+cloud",
            (true, false) => "local_only",
            (false, true) => "cloud_only",
            (false, false) => "unknown",
        }
    };

    json!({
        "equipment": {
            "hardware_probe": hardware_mem.is_some(),
            "ed_probe": ed_running.is_some(),
            "music_probe": music_playing.is_some(),
        },
        "current_alarms": alarms,
        "ed_status": {
            "running": ed_running.map(|r| r.state_value),
            "system_name": ed_system.map(|r| r.state_value),
        },
        "music_status": {
            "playing": music_playing.map(|r| r.state_value),
            "title": music_title.map(|r| r.state_value),
            "artist": music_artist.map(|r| r.state_value),
        },
        "ai_status": ai_status,
    })
}

fn condition_mode(condition: &str) -> String {
    let lower = condition.to_lowercase();
    if matches!(lower.as_str(), "game" | "work" | "standby" | "tutor") {
        lower
    } else {
        "standby".into()
    }
}

/// One supervisor pass: publish the derived condition and audit any
/// transition. Returns the current condition.
pub fn tick(state: &AppState, previous: Option<&str>) -> String {
    let condition = derive_watch_condition(&state.config, &state.logbook);
    let now = state.clock.now_iso();
    let mode = condition_mode(&condition);

    let publish = StateWrite {
        state_key: "system.watch_condition".into(),
        state_value: json!(condition.as_str()),
        source: SOURCE.into(),
        confidence: Some(1.0),
        observed_at_utc: now.clone(),
        updated_at_utc: now.clone(),
        event: Some(
            EventRecord::new(
                "STATE_UPDATED",
                SOURCE,
                now.clone(),
                json!({"state_key": "system.watch_condition", "value": condition.as_str()}),
            )
            .mode(Some(mode.clone()))
            .tags(&["watch_condition"]),
        ),
    };
    if let Err(error) = state.logbook.set_state(publish) {
        tracing::error!(%error, "failed to publish watch condition");
    }

    if previous == Some(condition.as_str()) {
        return condition;
    }

    let correlation = uuid::Uuid::new_v4().to_string();
    let changed = EventRecord::new(
        "WATCH_CONDITION_CHANGED",
        SOURCE,
        now.clone(),
        json!({"from": previous, "to": condition.as_str()}),
    )
    .severity(Severity::Info)
    .correlation_id(Some(correlation.clone()))
    .mode(Some(mode.clone()))
    .tags(&["watch_condition", "handover"]);
    if let Err(error) = state.logbook.record_event(&changed) {
        tracing::error!(%error, "failed to record watch condition change");
    }

    let note = EventRecord::new(
        "HANDOVER_NOTE",
        SOURCE,
        now,
        handover_snapshot(&state.logbook),
    )
    .correlation_id(Some(correlation))
    .mode(Some(mode))
    .tags(&["handover"]);
    if let Err(error) = state.logbook.record_event(&note) {
        tracing::error!(%error, "failed to record handover note");
    }

    tracing::info!(from = ?previous, to = %condition, "watch condition changed");
    condition
}

/// Supervisor loop, spawned as a background task at startup.
pub async fn run(state: AppState) {
    let interval = std::time::Duration::from_secs(state.config.supervisor.interval_sec.max(1));
    let mut ticker = tokio::time::interval(interval);
    let mut previous: Option<String> = None;
    loop {
        ticker.tick().await;
        let condition = tick(&state, previous.as_deref());
        previous = Some(condition);
    }
}
