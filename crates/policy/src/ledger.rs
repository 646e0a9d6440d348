//! Incident-scoped confirmation ledger.
//!
//! Process-local: a restart invalidates outstanding confirmations.
//! Records are garbage-collected one hour after their timestamp on every
//! insertion; the gating window itself (default 12 s) is the engine's call.

/// Retention horizon for recorded confirmations, in seconds.
const GC_HORIZON_SECS: f64 = 3600.0;

/// One recorded user confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRecord {
    pub incident_id: String,
    pub tool_name: String,
    pub token: String,
    pub ts: f64,
}

/// Append-and-trim store of confirmations, owned by the policy engine and
/// only touched under its mutex.
#[derive(Debug, Default)]
pub struct ConfirmationLedger {
    records: Vec<ConfirmationRecord>,
}

impl ConfirmationLedger {
    /// Record a confirmation. Empty inputs are ignored. Entries older than
    /// one hour before `ts` are dropped.
    pub fn record(&mut self, incident_id: &str, tool_name: &str, token: &str, ts: f64) {
        let incident_id = incident_id.trim();
        let tool_name = tool_name.trim();
        let token = token.trim();
        if incident_id.is_empty() || tool_name.is_empty() || token.is_empty() {
            return;
        }
        self.records.push(ConfirmationRecord {
            incident_id: incident_id.to_owned(),
            tool_name: tool_name.to_owned(),
            token: token.to_owned(),
            ts,
        });
        let cutoff = ts - GC_HORIZON_SECS;
        self.records.retain(|r| r.ts >= cutoff);
    }

    /// Most recent confirmation for `(incident_id, tool_key)`, narrowed by
    /// `token` when supplied.
    pub fn lookup(
        &self,
        incident_id: &str,
        tool_key: &str,
        token: Option<&str>,
    ) -> Option<ConfirmationRecord> {
        self.records
            .iter()
            .filter(|r| r.incident_id == incident_id && r.tool_name == tool_key)
            .filter(|r| token.map_or(true, |t| r.token == t))
            .max_by(|a, b| a.ts.total_cmp(&b.ts))
            .cloned()
    }
}
