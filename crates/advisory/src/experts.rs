//! Expert routing: pick a profile for a request and enforce per-expert
//! action permissions on the resulting proposal.
//!
//! The lore expert is advisory-only and may not propose input injection.

use wd_domain::intent::{Domain, IntentProposal};

/// A planner persona with retrieval scope and action rights.
#[derive(Debug, Clone)]
pub struct ExpertProfile {
    pub expert_id: &'static str,
    pub allow_actions: bool,
    pub retrieval_domains: &'static [&'static str],
    /// Tools this expert must never propose.
    pub deny_tools: &'static [&'static str],
}

const ED_GAMEPLAY: ExpertProfile = ExpertProfile {
    expert_id: "ed_gameplay",
    allow_actions: true,
    retrieval_domains: &["gameplay", "system", "general_gaming"],
    deny_tools: &[],
};

const LORE: ExpertProfile = ExpertProfile {
    expert_id: "lore",
    allow_actions: false,
    retrieval_domains: &["lore", "astrophysics"],
    deny_tools: &["keypress", "input.keypress"],
};

const NETWORK: ExpertProfile = ExpertProfile {
    expert_id: "network",
    allow_actions: true,
    retrieval_domains: &["networking", "system", "coding"],
    deny_tools: &[],
};

const CODING: ExpertProfile = ExpertProfile {
    expert_id: "coding",
    allow_actions: true,
    retrieval_domains: &["coding", "system"],
    deny_tools: &[],
};

const GENERAL: ExpertProfile = ExpertProfile {
    expert_id: "general",
    allow_actions: true,
    retrieval_domains: &["general", "system"],
    deny_tools: &[],
};

const KEYWORDS: &[(&str, &[&str])] = &[
    (
        "coding",
        &["python", "javascript", "typescript", "rust", "regex", "function", "code"],
    ),
    (
        "network",
        &["network", "dns", "router", "switch", "firewall", "latency", "packet"],
    ),
    (
        "lore",
        &["lore", "thargoid", "guardian", "galnet", "history", "story", "canon"],
    ),
    (
        "ed_gameplay",
        &[
            "hardpoint",
            "supercruise",
            "dock",
            "landing gear",
            "cargo scoop",
            "fsd",
            "jump",
            "night vision",
        ],
    ),
];

fn by_id(expert_id: &str) -> ExpertProfile {
    match expert_id {
        "ed_gameplay" => ED_GAMEPLAY,
        "lore" => LORE,
        "network" => NETWORK,
        "coding" => CODING,
        _ => GENERAL,
    }
}

fn domain_expert(domain: Domain) -> Option<&'static str> {
    match domain {
        Domain::Lore | Domain::Astrophysics => Some("lore"),
        Domain::Gameplay | Domain::GeneralGaming => Some("ed_gameplay"),
        Domain::Coding => Some("coding"),
        Domain::Networking => Some("network"),
        _ => None,
    }
}

/// Choose an expert from the declared domain, then keyword hints, then the
/// general profile.
pub fn select_expert_profile(domain: Option<Domain>, user_text: &str) -> ExpertProfile {
    if let Some(expert_id) = domain.and_then(domain_expert) {
        return by_id(expert_id);
    }
    let text = user_text.to_lowercase();
    for (expert_id, words) in KEYWORDS {
        if words.iter().any(|w| text.contains(w)) {
            return by_id(expert_id);
        }
    }
    GENERAL
}

/// Drop actions the expert may not propose and recompute `needs_tools`.
/// Returns the number of dropped actions.
pub fn apply_expert_action_permissions(
    proposal: &mut IntentProposal,
    expert: &ExpertProfile,
) -> usize {
    let before = proposal.proposed_actions.len();
    if !expert.allow_actions {
        proposal.proposed_actions.clear();
    } else if !expert.deny_tools.is_empty() {
        proposal
            .proposed_actions
            .retain(|a| !expert.deny_tools.contains(&a.tool_name.as_str()));
    }
    proposal.needs_tools = !proposal.proposed_actions.is_empty();
    before - proposal.proposed_actions.len()
}
