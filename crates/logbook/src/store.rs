//! The `Logbook` store.
//!
//! One SQLite connection behind a mutex; every public method is a complete
//! unit of work. Callers must not assume a transaction spanning
//! `upsert_intent` and later action-status updates.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use wd_domain::error::{Error, Result};
use wd_domain::event::{EventRecord, EventSink, Severity};
use wd_domain::intent::IntentProposal;
use wd_domain::state::StateRow;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Hard cap on `list_events` page size.
const MAX_EVENT_LIMIT: i64 = 1000;

fn db_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Integrity(e.to_string())
        }
        _ => Error::Storage(e.to_string()),
    }
}

fn to_json_string(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned())
}

fn parse_json(raw: Option<String>, fallback: Value) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(fallback)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One state upsert, with an optional event appended only when the value
/// actually changed.
#[derive(Debug, Clone)]
pub struct StateWrite {
    pub state_key: String,
    pub state_value: Value,
    pub source: String,
    pub confidence: Option<f64>,
    pub observed_at_utc: String,
    pub updated_at_utc: String,
    pub event: Option<EventRecord>,
}

/// Outcome of one state upsert.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub state_key: String,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Serialize)]
pub struct BatchStateResult {
    pub upserted: usize,
    pub changed: usize,
    pub items: Vec<StateChange>,
}

/// Intent row as the executor reads it back.
#[derive(Debug, Clone)]
pub struct IntentRow {
    pub request_id: String,
    pub session_id: Option<String>,
    pub mode: String,
    pub domain: String,
    pub urgency: String,
    pub user_text: String,
    pub response_text: String,
}

/// Action row as the executor reads it back.
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub id: i64,
    pub request_id: String,
    pub action_id: String,
    pub tool_name: String,
    pub status: String,
    pub safety_level: String,
    pub parameters_json: String,
}

/// The action metadata persisted at intent upsert, parsed back leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredActionParams {
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub mode_constraints: Vec<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub timeout_ms: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl ActionRow {
    pub fn params(&self) -> StoredActionParams {
        serde_json::from_str(&self.parameters_json).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "success" | "error" | "timeout" | "denied")
    }
}

/// Filters for `list_events`.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub limit: Option<i64>,
    pub event_type: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub since: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logbook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SQLite persistence façade, safe to share across the HTTP handlers and
/// the supervisor task.
pub struct Logbook {
    conn: Mutex<Connection>,
}

impl Logbook {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Append one event. Fallible variant; the `EventSink` impl logs
    /// failures instead so audit emission never interrupts a request.
    pub fn record_event(&self, event: &EventRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO event_log(
                event_id, timestamp_utc, event_type, source, session_id,
                correlation_id, mode, severity, payload_json, tags_json
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                event.event_id,
                event.timestamp_utc,
                event.event_type,
                event.source,
                event.session_id,
                event.correlation_id,
                event.mode,
                event.severity.as_str(),
                to_json_string(&event.payload),
                serde_json::to_string(&event.tags).unwrap_or_else(|_| "[]".into()),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Recent events, newest first by rowid.
    pub fn list_events(&self, query: &EventQuery) -> Result<Vec<EventRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(event_type) = &query.event_type {
            clauses.push("event_type = ?");
            args.push(Box::new(event_type.clone()));
        }
        if let Some(session_id) = &query.session_id {
            clauses.push("session_id = ?");
            args.push(Box::new(session_id.clone()));
        }
        if let Some(correlation_id) = &query.correlation_id {
            clauses.push("correlation_id = ?");
            args.push(Box::new(correlation_id.clone()));
        }
        if let Some(since) = &query.since {
            clauses.push("timestamp_utc >= ?");
            args.push(Box::new(since.clone()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = query.limit.unwrap_or(100).clamp(1, MAX_EVENT_LIMIT);
        args.push(Box::new(limit));

        let sql = format!(
            "SELECT event_id, timestamp_utc, event_type, source, session_id,
                    correlation_id, mode, severity, payload_json, tags_json
             FROM event_log {where_sql} ORDER BY id DESC LIMIT ?"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                let severity: String = row.get(7)?;
                let payload: Option<String> = row.get(8)?;
                let tags: Option<String> = row.get(9)?;
                Ok(EventRecord {
                    event_id: row.get(0)?,
                    timestamp_utc: row.get(1)?,
                    event_type: row.get(2)?,
                    source: row.get(3)?,
                    session_id: row.get(4)?,
                    correlation_id: row.get(5)?,
                    mode: row.get(6)?,
                    severity: match severity.as_str() {
                        "warn" => Severity::Warn,
                        "error" => Severity::Error,
                        _ => Severity::Info,
                    },
                    payload: parse_json(payload, Value::Object(Default::default())),
                    tags: match parse_json(tags, Value::Array(vec![])) {
                        Value::Array(items) => items
                            .into_iter()
                            .filter_map(|v| v.as_str().map(str::to_owned))
                            .collect(),
                        _ => Vec::new(),
                    },
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    // ── State ────────────────────────────────────────────────────────

    /// Upsert one state key. The attached event is appended only when the
    /// stored value actually changed (canonical JSON comparison).
    pub fn set_state(&self, write: StateWrite) -> Result<StateChange> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let change = upsert_state_tx(&tx, write)?;
        tx.commit().map_err(db_err)?;
        Ok(change)
    }

    /// Upsert a batch of state keys atomically.
    pub fn batch_set_state(&self, writes: Vec<StateWrite>) -> Result<BatchStateResult> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let mut items = Vec::with_capacity(writes.len());
        let mut changed = 0;
        for write in writes {
            let change = upsert_state_tx(&tx, write)?;
            if change.changed {
                changed += 1;
            }
            items.push(change);
        }
        tx.commit().map_err(db_err)?;
        Ok(BatchStateResult {
            upserted: items.len(),
            changed,
            items,
        })
    }

    pub fn get_state(&self, state_key: &str) -> Result<Option<StateRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT state_key, state_value_json, source, confidence,
                    observed_at_utc, updated_at_utc
             FROM state_current WHERE state_key = ?1",
            params![state_key],
            map_state_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn list_state(&self) -> Result<Vec<StateRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT state_key, state_value_json, source, confidence,
                        observed_at_utc, updated_at_utc
                 FROM state_current ORDER BY updated_at_utc DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], map_state_row)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    // ── Intents & actions ────────────────────────────────────────────

    /// Replace the intent row for `request_id` and re-insert every proposed
    /// action in state `queued`. Emits `INTENT_PROPOSED` in the same
    /// transaction. Returns the number of queued actions.
    pub fn upsert_intent(
        &self,
        intent: &IntentProposal,
        source: &str,
        now_utc: &str,
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO intent_log(
                request_id, schema_version, timestamp_utc, session_id, mode,
                domain, urgency, user_text, needs_tools, needs_clarification,
                clarification_questions_json, retrieval_json,
                proposed_actions_json, response_text, created_at_utc
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                intent.request_id,
                intent.schema_version,
                intent.timestamp_utc,
                intent.session_id,
                serde_json::to_value(intent.mode)?.as_str().unwrap_or("standby"),
                serde_json::to_value(intent.domain)?.as_str().unwrap_or("general"),
                serde_json::to_value(intent.urgency)?.as_str().unwrap_or("normal"),
                intent.user_text,
                intent.needs_tools as i64,
                intent.needs_clarification as i64,
                serde_json::to_string(&intent.clarification_questions)?,
                to_json_string(intent.retrieval.as_ref().unwrap_or(&Value::Object(Default::default()))),
                serde_json::to_string(&intent.proposed_actions)?,
                intent.response_text,
                now_utc,
            ],
        )
        .map_err(db_err)?;

        tx.execute(
            "DELETE FROM action_log WHERE request_id = ?1",
            params![intent.request_id],
        )
        .map_err(db_err)?;

        let mut count = 0;
        for action in &intent.proposed_actions {
            let stored = StoredActionParams {
                parameters: action.parameters.clone(),
                mode_constraints: action
                    .mode_constraints
                    .clone()
                    .unwrap_or_default()
                    .iter()
                    .map(|m| m.as_str().to_owned())
                    .collect(),
                requires_confirmation: action.requires_confirmation(),
                timeout_ms: Some(action.timeout_ms),
                confidence: Some(action.confidence),
            };
            tx.execute(
                "INSERT INTO action_log(
                    request_id, action_id, tool_name, status, safety_level,
                    mode_at_execution, reason, parameters_json, created_at_utc
                 ) VALUES (?1,?2,?3,'queued',?4,?5,?6,?7,?8)",
                params![
                    intent.request_id,
                    action.action_id,
                    action.tool_name,
                    serde_json::to_value(action.safety_level)?.as_str().unwrap_or("low_risk"),
                    intent.mode.as_str(),
                    action.reason,
                    serde_json::to_string(&stored)?,
                    now_utc,
                ],
            )
            .map_err(db_err)?;
            count += 1;
        }

        let action_ids: Vec<&str> = intent
            .proposed_actions
            .iter()
            .map(|a| a.action_id.as_str())
            .collect();
        let event = EventRecord::new(
            "INTENT_PROPOSED",
            source,
            now_utc,
            serde_json::json!({
                "request_id": intent.request_id,
                "actions": action_ids,
                "domain": intent.domain,
                "urgency": intent.urgency,
            }),
        )
        .session_id(intent.session_id.clone())
        .correlation_id(Some(intent.request_id.clone()))
        .mode(Some(intent.mode.as_str()));
        insert_event_tx(&tx, &event)?;

        tx.commit().map_err(db_err)?;
        Ok(count)
    }

    pub fn get_intent(&self, request_id: &str) -> Result<Option<IntentRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT request_id, session_id, mode, domain, urgency, user_text, response_text
             FROM intent_log WHERE request_id = ?1",
            params![request_id],
            |row| {
                Ok(IntentRow {
                    request_id: row.get(0)?,
                    session_id: row.get(1)?,
                    mode: row.get(2)?,
                    domain: row.get(3)?,
                    urgency: row.get(4)?,
                    user_text: row.get(5)?,
                    response_text: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    /// Actions for a request in insertion order, optionally filtered to a
    /// set of action ids.
    pub fn list_actions(
        &self,
        request_id: &str,
        action_ids: Option<&[String]>,
    ) -> Result<Vec<ActionRow>> {
        let mut sql = String::from(
            "SELECT id, request_id, action_id, tool_name, status, safety_level, parameters_json
             FROM action_log WHERE request_id = ?",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(request_id.to_owned())];
        if let Some(ids) = action_ids.filter(|ids| !ids.is_empty()) {
            let placeholders = vec!["?"; ids.len()].join(",");
            sql.push_str(&format!(" AND action_id IN ({placeholders})"));
            for id in ids {
                args.push(Box::new(id.clone()));
            }
        }
        sql.push_str(" ORDER BY id ASC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                Ok(ActionRow {
                    id: row.get(0)?,
                    request_id: row.get(1)?,
                    action_id: row.get(2)?,
                    tool_name: row.get(3)?,
                    status: row.get(4)?,
                    safety_level: row.get(5)?,
                    parameters_json: row.get(6)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Keep the action `queued` but stamp the confirmation deny on it.
    pub fn action_requires_confirmation(
        &self,
        id: i64,
        error_code: &str,
        error_message: &str,
        ended_at_utc: &str,
    ) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE action_log
                 SET status='queued', error_code=?2, error_message=?3, ended_at_utc=?4
                 WHERE id=?1",
                params![id, error_code, error_message, ended_at_utc],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn action_denied(
        &self,
        id: i64,
        error_code: &str,
        error_message: &str,
        ended_at_utc: &str,
    ) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE action_log
                 SET status='denied', error_code=?2, error_message=?3, ended_at_utc=?4
                 WHERE id=?1",
                params![id, error_code, error_message, ended_at_utc],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn action_approved(&self, id: i64, started_at_utc: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE action_log SET status='approved', started_at_utc=?2 WHERE id=?1",
                params![id, started_at_utc],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Terminal transition: `success`, `error`, or `timeout`.
    pub fn action_finalized(
        &self,
        id: i64,
        status: &str,
        output: Option<&Value>,
        error_code: Option<&str>,
        error_message: Option<&str>,
        ended_at_utc: &str,
    ) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "UPDATE action_log
                 SET status=?2, output_json=?3, error_code=?4, error_message=?5, ended_at_utc=?6
                 WHERE id=?1",
                params![
                    id,
                    status,
                    output.map(to_json_string),
                    error_code,
                    error_message,
                    ended_at_utc,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    // ── Feedback ─────────────────────────────────────────────────────

    /// Record a user rating against an existing intent.
    pub fn insert_feedback(
        &self,
        request_id: &str,
        rating: i64,
        correction_text: Option<&str>,
        reviewer: &str,
        now_utc: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let exists: Option<String> = conn
            .query_row(
                "SELECT request_id FROM intent_log WHERE request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("request_id not found: {request_id}")));
        }
        conn.execute(
            "INSERT INTO feedback_log(request_id, rating, correction_text, reviewer, created_at_utc)
             VALUES (?1,?2,?3,?4,?5)",
            params![request_id, rating, correction_text, reviewer, now_utc],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }
}

impl EventSink for Logbook {
    fn append_event(&self, event: EventRecord) {
        if let Err(error) = self.record_event(&event) {
            tracing::error!(
                event_type = %event.event_type,
                %error,
                "failed to append audit event"
            );
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transaction helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn insert_event_tx(tx: &rusqlite::Transaction<'_>, event: &EventRecord) -> Result<()> {
    tx.execute(
        "INSERT INTO event_log(
            event_id, timestamp_utc, event_type, source, session_id,
            correlation_id, mode, severity, payload_json, tags_json
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        params![
            event.event_id,
            event.timestamp_utc,
            event.event_type,
            event.source,
            event.session_id,
            event.correlation_id,
            event.mode,
            event.severity.as_str(),
            to_json_string(&event.payload),
            serde_json::to_string(&event.tags).unwrap_or_else(|_| "[]".into()),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn upsert_state_tx(tx: &rusqlite::Transaction<'_>, write: StateWrite) -> Result<StateChange> {
    let previous: Option<String> = tx
        .query_row(
            "SELECT state_value_json FROM state_current WHERE state_key = ?1",
            params![write.state_key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    let previous_value = previous.as_deref().and_then(|s| serde_json::from_str::<Value>(s).ok());
    let changed = previous_value.as_ref() != Some(&write.state_value);

    tx.execute(
        "INSERT INTO state_current(
            state_key, state_value_json, source, confidence, observed_at_utc, updated_at_utc
         ) VALUES (?1,?2,?3,?4,?5,?6)
         ON CONFLICT(state_key) DO UPDATE SET
            state_value_json=excluded.state_value_json,
            source=excluded.source,
            confidence=excluded.confidence,
            observed_at_utc=excluded.observed_at_utc,
            updated_at_utc=excluded.updated_at_utc",
        params![
            write.state_key,
            to_json_string(&write.state_value),
            write.source,
            write.confidence,
            write.observed_at_utc,
            write.updated_at_utc,
        ],
    )
    .map_err(db_err)?;

    let mut event_id = None;
    if changed {
        if let Some(event) = &write.event {
            insert_event_tx(tx, event)?;
            event_id = Some(event.event_id.clone());
        }
    }

    Ok(StateChange {
        state_key: write.state_key,
        changed,
        event_id,
    })
}

fn map_state_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateRow> {
    let value: String = row.get(1)?;
    Ok(StateRow {
        state_key: row.get(0)?,
        state_value: serde_json::from_str(&value).unwrap_or(Value::Null),
        source: row.get(2)?,
        confidence: row.get(3)?,
        observed_at_utc: row.get(4)?,
        updated_at_utc: row.get(5)?,
    })
}
