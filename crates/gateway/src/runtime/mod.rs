pub mod actuators;
pub mod assist;
pub mod executor;
pub mod foreground;
pub mod keys;
pub mod supervisor;

use wd_logbook::Logbook;

/// Resolve the effective watch condition for an execution or preview pass:
/// explicit request value, then the persisted supervisor/policy state, then
/// a mapping from the intent's mode, then the configured default.
pub fn resolve_watch_condition(
    requested: Option<&str>,
    intent_mode: &str,
    logbook: &Logbook,
    default_watch_condition: &str,
) -> String {
    if let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) {
        return requested.to_uppercase();
    }
    for key in ["policy.watch_condition", "system.watch_condition"] {
        if let Ok(Some(row)) = logbook.get_state(key) {
            if let Some(value) = row.state_value.as_str() {
                let value = value.trim();
                if !value.is_empty() {
                    return value.to_uppercase();
                }
            }
        }
    }
    match intent_mode {
        "game" => "GAME".into(),
        "work" => "WORK".into(),
        "standby" => "STANDBY".into(),
        "tutor" => "TUTOR".into(),
        _ => default_watch_condition.to_uppercase(),
    }
}
