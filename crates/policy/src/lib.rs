//! Standing Orders policy engine.
//!
//! Decides, for every proposed tool invocation, whether the action is
//! presently permitted: ALLOW, DENY, or NEEDS-CONFIRMATION. The engine owns
//! the confirmation ledger and the per-bucket rate windows; the tool router
//! is the single entry point through which decisions are produced.

pub mod canonical;
pub mod engine;
pub mod ledger;
pub mod orders;
pub mod pattern;
pub mod rate;
pub mod router;
pub mod types;

pub use canonical::canonical_tool_name;
pub use engine::PolicyEngine;
pub use router::{RouteContext, RoutedDecision, ToolRouter};
pub use types::{ActionRequest, Constraints, Decision, ReasonCode};
