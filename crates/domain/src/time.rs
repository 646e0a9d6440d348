//! UTC timestamp helpers and the clock seam.
//!
//! Persisted timestamps use the microsecond form `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
//! Parsing accepts a trailing `Z` or an explicit `+00:00` offset.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Current UTC time in the persisted wire format.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an ISO-8601 UTC timestamp, accepting `...Z` or `...+00:00`.
pub fn parse_iso8601_utc(value: &str) -> Result<DateTime<Utc>> {
    if value.is_empty() {
        return Err(Error::validation("timestamp must be a non-empty string"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::validation(format!("timestamp must be ISO-8601: {value}")))
}

/// Convert an ISO-8601 UTC timestamp to epoch seconds.
pub fn iso8601_utc_to_epoch(value: &str) -> Result<f64> {
    let dt = parse_iso8601_utc(value)?;
    Ok(dt.timestamp_micros() as f64 / 1_000_000.0)
}

/// Wall-clock seam so real-time callers and tests share one time source.
///
/// Policy evaluation itself is deterministic over caller-supplied `now_ts`;
/// the clock only feeds the paths that must stamp "now" themselves (the
/// executor, the supervisor, event timestamps).
pub trait Clock: Send + Sync {
    /// Epoch seconds.
    fn now_ts(&self) -> f64;

    /// Current UTC time in the persisted wire format.
    fn now_iso(&self) -> String {
        let micros = (self.now_ts() * 1_000_000.0) as i64;
        DateTime::<Utc>::from_timestamp_micros(micros)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ts(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }

    fn now_iso(&self) -> String {
        utc_now_iso()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: parking_lot::Mutex<f64>,
}

impl ManualClock {
    pub fn at(ts: f64) -> Self {
        Self {
            now: parking_lot::Mutex::new(ts),
        }
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, ts: f64) {
        *self.now.lock() = ts;
    }
}

impl Clock for ManualClock {
    fn now_ts(&self) -> f64 {
        *self.now.lock()
    }
}
