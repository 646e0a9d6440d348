//! The policy engine: loads Standing Orders, owns the confirmation ledger
//! and rate windows, and turns `ActionRequest`s into `Decision`s.
//!
//! One coarse mutex protects the document, the ledger, and the rate windows.
//! Nothing inside the critical section performs I/O; document reload parses
//! the file first and swaps the result in afterwards.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

use wd_domain::error::{Error, Result};

use crate::canonical::canonical_tool_name;
use crate::ledger::ConfirmationLedger;
use crate::orders::StandingOrders;
use crate::pattern::any_match;
use crate::rate::RateWindows;
use crate::types::{ActionRequest, Constraints, Decision, ReasonCode};

/// Confirmation window used when the document omits one.
pub const DEFAULT_CONFIRM_WINDOW_SECS: f64 = 12.0;

struct EngineInner {
    orders: StandingOrders,
    mtime: Option<SystemTime>,
    ledger: ConfirmationLedger,
    windows: RateWindows,
}

/// Deterministic decision function over a Standing Orders document.
pub struct PolicyEngine {
    path: PathBuf,
    inner: Mutex<EngineInner>,
}

impl PolicyEngine {
    /// Load the Standing Orders document at `path` and build an engine.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (orders, mtime) = parse_document(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(EngineInner {
                orders,
                mtime,
                ledger: ConfirmationLedger::default(),
                windows: RateWindows::default(),
            }),
        })
    }

    /// Re-parse the document if its mtime changed. Idempotent; keeps the
    /// confirmation ledger and rate windows across reloads.
    pub fn maybe_reload(&self) -> Result<()> {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return Ok(());
        };
        let mtime = metadata.modified().ok();
        {
            let inner = self.inner.lock();
            if inner.mtime.is_some() && inner.mtime == mtime {
                return Ok(());
            }
        }
        let (orders, mtime) = parse_document(&self.path)?;
        let mut inner = self.inner.lock();
        inner.orders = orders;
        inner.mtime = mtime;
        tracing::info!(path = %self.path.display(), "standing orders reloaded");
        Ok(())
    }

    /// The configured confirmation window in seconds.
    pub fn confirm_window_seconds(&self) -> f64 {
        let window = self.inner.lock().orders.defaults.confirm_window_seconds;
        if window >= 0.0 {
            window
        } else {
            DEFAULT_CONFIRM_WINDOW_SECS
        }
    }

    /// Immutable snapshot of the current document.
    pub fn snapshot(&self) -> StandingOrders {
        self.inner.lock().orders.clone()
    }

    /// Record a user-granted confirmation under `(incident_id, canonical
    /// tool)`. Ledger entries older than one hour are collected.
    pub fn record_confirmation(&self, incident_id: &str, tool_name: &str, token: &str, ts: f64) {
        let tool_key = canonical_tool_name(tool_name);
        self.inner
            .lock()
            .ledger
            .record(incident_id, &tool_key, token, ts);
    }

    /// Evaluate one action request against the current Standing Orders.
    ///
    /// Fails only when a changed document no longer parses; denials are
    /// returned as `Decision` values.
    pub fn evaluate(&self, req: &ActionRequest) -> Result<Decision> {
        self.maybe_reload()?;

        let tool_key = canonical_tool_name(&req.tool_name);
        let now_ts = req.now_ts;
        let mut constraints = Constraints::default();

        let mut inner = self.inner.lock();
        let defaults = inner.orders.defaults.clone();

        if req.watch_condition.trim().is_empty() {
            return Ok(Decision::deny(
                ReasonCode::DenyPolicyInvalid,
                "watch_condition is required",
                constraints,
            ));
        }

        if defaults.require_incident_id && req.incident_id.trim().is_empty() {
            return Ok(Decision::deny(
                ReasonCode::DenyPolicyInvalid,
                "incident_id is required by policy",
                constraints,
            ));
        }

        let Some(condition) = inner.orders.resolve_condition(&req.watch_condition) else {
            return Ok(Decision::deny(
                ReasonCode::DenyPolicyInvalid,
                format!("unknown watch_condition: {}", req.watch_condition),
                constraints,
            ));
        };

        if any_match(&condition.deny_tools, &tool_key) {
            return Ok(Decision::deny(
                ReasonCode::DenyExplicitlyDenied,
                format!("{tool_key} denied in {}", req.watch_condition),
                constraints,
            ));
        }

        if !condition.allowed_tools.is_empty() && !any_match(&condition.allowed_tools, &tool_key) {
            return Ok(Decision::deny(
                ReasonCode::DenyNotAllowedInCondition,
                format!("{tool_key} not allowed in {}", req.watch_condition),
                constraints,
            ));
        }

        let guardrails = condition.guardrails;
        let confirmation = condition.confirmation;
        let tool_policy = inner.orders.tool_policies.find(&tool_key);

        let stt_min = defaults.stt_min_confidence;
        let stt_low = req
            .stt_confidence
            .map(|c| c < stt_min)
            .unwrap_or(false);

        if guardrails.stt_requires_confidence_for_input.unwrap_or(false)
            && tool_key == "input.keypress"
            && stt_low
        {
            return Ok(Decision::deny(
                ReasonCode::DenyLowSttConfidence,
                format!(
                    "stt_confidence {:?} below threshold {stt_min}",
                    req.stt_confidence
                ),
                constraints,
            ));
        }

        if stt_low && tool_policy.deny_if.iter().any(|d| d == "stt_confidence_low") {
            return Ok(Decision::deny(
                ReasonCode::DenyLowSttConfidence,
                format!(
                    "tool policy deny_if stt_confidence_low ({:?} < {stt_min})",
                    req.stt_confidence
                ),
                constraints,
            ));
        }

        let foreground_expected: Vec<String> = guardrails
            .foreground_process_must_be
            .clone()
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        let foreground_gated = tool_key == "input.keypress"
            || tool_policy.requires.iter().any(|r| r == "foreground_ok");
        if !foreground_expected.is_empty() && foreground_gated {
            let matches = req
                .foreground_process
                .as_deref()
                .map(|fg| foreground_expected.contains(&fg.to_lowercase()))
                .unwrap_or(false);
            if !matches {
                return Ok(Decision::deny(
                    ReasonCode::DenyForegroundMismatch,
                    format!(
                        "foreground '{}' not in allowed {}",
                        req.foreground_process.as_deref().unwrap_or(""),
                        foreground_expected.join(", ")
                    ),
                    constraints,
                ));
            }
        }

        if defaults.ui_foreground_required_for_input
            && tool_key == "input.keypress"
            && req
                .foreground_process
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Ok(Decision::deny(
                ReasonCode::DenyForegroundMismatch,
                "foreground process required for input.keypress",
                constraints,
            ));
        }

        let condition_key = req.watch_condition.trim().to_uppercase();

        if tool_key == "input.keypress" {
            if let Some(max_kpm) = guardrails.max_keypress_per_minute.filter(|k| *k > 0) {
                let bucket = format!("{condition_key}:{tool_key}:guardrail");
                let (ok, remaining) = inner.windows.check(&bucket, now_ts, max_kpm);
                constraints.rate_limit_remaining = Some(remaining);
                if !ok {
                    return Ok(Decision::deny(
                        ReasonCode::DenyRateLimit,
                        format!("max_keypress_per_minute exceeded ({max_kpm}/min)"),
                        constraints,
                    ));
                }
            }
        }

        if let Some(tool_rl) = tool_policy.rate_limit_per_minute.filter(|k| *k > 0) {
            let bucket = format!("{condition_key}:{tool_key}:tool_policy");
            let (ok, remaining) = inner.windows.check(&bucket, now_ts, tool_rl);
            constraints.rate_limit_remaining = Some(remaining);
            if !ok {
                return Ok(Decision::deny(
                    ReasonCode::DenyRateLimit,
                    format!("tool rate limit exceeded ({tool_rl}/min)"),
                    constraints,
                ));
            }
        }

        let mut requires_confirmation = false;
        if any_match(confirmation.always.as_deref().unwrap_or(&[]), &tool_key) {
            requires_confirmation = true;
        }
        if stt_low
            && any_match(
                confirmation.when_low_confidence.as_deref().unwrap_or(&[]),
                &tool_key,
            )
        {
            requires_confirmation = true;
        }
        if guardrails
            .require_confirmation_for_all_actions
            .unwrap_or(false)
        {
            requires_confirmation = true;
        }
        if tool_policy.requires.iter().any(|r| r == "recent_user_confirm") {
            requires_confirmation = true;
        }

        if requires_confirmation {
            let window = if defaults.confirm_window_seconds >= 0.0 {
                defaults.confirm_window_seconds
            } else {
                DEFAULT_CONFIRM_WINDOW_SECS
            };
            constraints.confirm_by_ts = Some(now_ts + window);
            let record = inner.ledger.lookup(
                req.incident_id.trim(),
                &tool_key,
                req.user_confirm_token.as_deref().filter(|t| !t.is_empty()),
            );
            match record {
                None => {
                    return Ok(Decision::needs_confirmation(
                        ReasonCode::DenyNeedsConfirmation,
                        format!("{tool_key} requires user confirmation"),
                        constraints,
                    ));
                }
                Some(record) => {
                    let age = now_ts - record.ts;
                    if age > window {
                        return Ok(Decision::needs_confirmation(
                            ReasonCode::DenyConfirmationExpired,
                            format!("confirmation expired ({age:.1}s > {window}s)"),
                            constraints,
                        ));
                    }
                }
            }
        }

        Ok(Decision::allow(constraints))
    }
}

fn parse_document(path: &Path) -> Result<(StandingOrders, Option<SystemTime>)> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Policy(format!("file not found: {} ({e})", path.display()))
    })?;
    let orders: StandingOrders = serde_json::from_str(&raw)
        .map_err(|e| Error::Policy(format!("{}: {e}", path.display())))?;
    orders.validate()?;
    let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
    Ok((orders, mtime))
}
