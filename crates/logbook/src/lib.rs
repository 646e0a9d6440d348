//! SQLite-backed persistence façade: the append-only event log, the
//! current-state map, the intent/action log, and user feedback.
//!
//! Callers treat this as an interface; the schema is an implementation
//! detail shipped as an embedded `schema.sql`. The monotonic rowid of the
//! event log provides the total ordering audit queries rely on.

pub mod audit;
pub mod store;

pub use store::{
    ActionRow, BatchStateResult, EventQuery, IntentRow, Logbook, StateChange, StateWrite,
    StoredActionParams,
};
