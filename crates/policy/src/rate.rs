//! Sliding-window rate limiters, one bucket per `{condition}:{tool}:{kind}`.
//!
//! Buckets keep raw timestamps from the last 60 seconds. Mutation happens
//! only under the engine mutex.

use std::collections::HashMap;

/// Window length in seconds.
const WINDOW_SECS: f64 = 60.0;

/// All rate-limit buckets for one engine.
#[derive(Debug, Default)]
pub struct RateWindows {
    windows: HashMap<String, Vec<f64>>,
}

impl RateWindows {
    /// Check-and-record: drop timestamps older than 60 s, reject if the
    /// bucket is full, otherwise record `now_ts`. Returns
    /// `(allowed, remaining)` where `remaining` counts calls left in the
    /// current window after this one.
    pub fn check(&mut self, bucket_key: &str, now_ts: f64, limit_per_minute: u32) -> (bool, u32) {
        let window = self.windows.entry(bucket_key.to_owned()).or_default();
        let cutoff = now_ts - WINDOW_SECS;
        window.retain(|t| *t >= cutoff);
        if window.len() >= limit_per_minute as usize {
            return (false, 0);
        }
        window.push(now_ts);
        let remaining = limit_per_minute.saturating_sub(window.len() as u32);
        (true, remaining)
    }
}
