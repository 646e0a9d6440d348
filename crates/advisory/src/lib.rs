//! Advisory client: calls the external LLM planner, validates its JSON
//! proposal against the intent contract, and falls back to a safe
//! clarification-only proposal on anything malformed.

pub mod client;
pub mod contract;
pub mod experts;
pub mod extract;
pub mod fallback;

pub use client::{AdvisoryClient, AdvisoryMeta};
pub use contract::Contract;
pub use experts::{apply_expert_action_permissions, select_expert_profile, ExpertProfile};
