//! The Standing Orders document: typed schema, load-time validation, and
//! condition inheritance resolution.
//!
//! Condition fields are `Option`s so inheritance can distinguish "unset"
//! (inherit the parent's value) from "set" (override it). List fields
//! override wholesale; `guardrails` and `confirmation` merge field-wise.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use wd_domain::error::{Error, Result};

use crate::pattern;

/// Watch conditions that every valid document must define.
pub const REQUIRED_CONDITIONS: [&str; 6] = [
    "STANDBY",
    "GAME",
    "WORK",
    "TUTOR",
    "RESTRICTED",
    "DEGRADED",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Engine-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    pub confirm_window_seconds: f64,
    pub stt_min_confidence: f64,
    pub ui_foreground_required_for_input: bool,
    #[serde(default = "d_true")]
    pub require_incident_id: bool,
    #[serde(default)]
    pub log_all_denies: bool,
    #[serde(default)]
    pub log_all_executes: bool,
}

fn d_true() -> bool {
    true
}

/// Per-condition hard limits and gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardRails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_process_must_be: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keypress_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_requires_confidence_for_input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_confirmation_for_all_actions: Option<bool>,
}

/// Per-condition confirmation pattern lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_low_confidence: Option<Vec<String>>,
}

/// One watch condition as written in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardRails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationRules>,
}

/// Per-tool-pattern policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub deny_if: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_minute: Option<u32>,
}

/// Ordered pattern → policy map. The first matching pattern in document
/// order wins, so insertion order must survive deserialization.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicies(pub Vec<(String, ToolPolicy)>);

impl ToolPolicies {
    /// First pattern (in document order) matching the canonical tool name.
    pub fn find(&self, tool_key: &str) -> ToolPolicy {
        self.0
            .iter()
            .find(|(pattern, _)| pattern::glob_match(pattern, tool_key))
            .map(|(_, policy)| policy.clone())
            .unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for ToolPolicies {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ToolPolicies;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of tool patterns to tool policies")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((pattern, policy)) = map.next_entry::<String, ToolPolicy>()? {
                    entries.push((pattern, policy));
                }
                Ok(ToolPolicies(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl Serialize for ToolPolicies {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (pattern, policy) in &self.0 {
            map.serialize_entry(pattern, policy)?;
        }
        map.end()
    }
}

/// The full Standing Orders document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingOrders {
    pub version: serde_json::Value,
    pub defaults: Defaults,
    pub watch_conditions: HashMap<String, ConditionPolicy>,
    pub tool_policies: ToolPolicies,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A condition with inheritance flattened away.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCondition {
    pub allowed_tools: Vec<String>,
    pub deny_tools: Vec<String>,
    pub guardrails: GuardRails,
    pub confirmation: ConfirmationRules,
}

fn merge_guardrails(parent: GuardRails, child: &GuardRails) -> GuardRails {
    GuardRails {
        foreground_process_must_be: child
            .foreground_process_must_be
            .clone()
            .or(parent.foreground_process_must_be),
        max_keypress_per_minute: child
            .max_keypress_per_minute
            .or(parent.max_keypress_per_minute),
        stt_requires_confidence_for_input: child
            .stt_requires_confidence_for_input
            .or(parent.stt_requires_confidence_for_input),
        require_confirmation_for_all_actions: child
            .require_confirmation_for_all_actions
            .or(parent.require_confirmation_for_all_actions),
    }
}

fn merge_confirmation(parent: ConfirmationRules, child: &ConfirmationRules) -> ConfirmationRules {
    ConfirmationRules {
        always: child.always.clone().or(parent.always),
        when_low_confidence: child.when_low_confidence.clone().or(parent.when_low_confidence),
    }
}

/// Merge a child condition onto its resolved parent: list fields override
/// wholesale, the nested records merge field-wise.
fn merge_condition(parent: ResolvedCondition, child: &ConditionPolicy) -> ResolvedCondition {
    ResolvedCondition {
        allowed_tools: child.allowed_tools.clone().unwrap_or(parent.allowed_tools),
        deny_tools: child.deny_tools.clone().unwrap_or(parent.deny_tools),
        guardrails: merge_guardrails(
            parent.guardrails,
            child.guardrails.as_ref().unwrap_or(&GuardRails::default()),
        ),
        confirmation: merge_confirmation(
            parent.confirmation,
            child
                .confirmation
                .as_ref()
                .unwrap_or(&ConfirmationRules::default()),
        ),
    }
}

impl StandingOrders {
    /// Resolve a watch condition, following `inherits` recursively.
    ///
    /// A missing parent resolves as empty (the child is used as-is). Returns
    /// `None` for an unknown condition. Documents are cycle-checked at load,
    /// so the visited set here is a backstop, not a reporting path.
    pub fn resolve_condition(&self, watch_condition: &str) -> Option<ResolvedCondition> {
        self.resolve_inner(&watch_condition.to_uppercase(), &mut HashSet::new())
    }

    fn resolve_inner(&self, key: &str, visited: &mut HashSet<String>) -> Option<ResolvedCondition> {
        let conf = self.watch_conditions.get(key)?;
        if !visited.insert(key.to_owned()) {
            return Some(ResolvedCondition::default());
        }
        let parent = conf
            .inherits
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| self.resolve_inner(&p.to_uppercase(), visited))
            .unwrap_or_default();
        Some(merge_condition(parent, conf))
    }

    /// Structural validation beyond what serde enforces: required conditions,
    /// inheritance cycles, and glob pattern syntax.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_CONDITIONS
            .iter()
            .copied()
            .filter(|c| !self.watch_conditions.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Policy(format!(
                "missing watch_conditions: {}",
                missing.join(", ")
            )));
        }

        for name in self.watch_conditions.keys() {
            self.check_inheritance_chain(name)?;
        }

        for (name, conf) in &self.watch_conditions {
            for pattern in conf
                .allowed_tools
                .iter()
                .flatten()
                .chain(conf.deny_tools.iter().flatten())
            {
                check_pattern(pattern, &format!("watch_conditions.{name}"))?;
            }
            if let Some(confirmation) = &conf.confirmation {
                for pattern in confirmation
                    .always
                    .iter()
                    .flatten()
                    .chain(confirmation.when_low_confidence.iter().flatten())
                {
                    check_pattern(pattern, &format!("watch_conditions.{name}.confirmation"))?;
                }
            }
        }

        for (pattern, _) in &self.tool_policies.0 {
            check_pattern(pattern, "tool_policies")?;
        }

        if self.defaults.confirm_window_seconds < 0.0 {
            return Err(Error::Policy(
                "defaults.confirm_window_seconds must be non-negative".into(),
            ));
        }

        Ok(())
    }

    fn check_inheritance_chain(&self, start: &str) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = start.to_uppercase();
        loop {
            if !visited.insert(current.clone()) {
                return Err(Error::Policy(format!(
                    "inheritance cycle through watch_conditions.{start}"
                )));
            }
            let Some(conf) = self.watch_conditions.get(&current) else {
                // A missing parent is tolerated; the child is used as-is.
                return Ok(());
            };
            match conf.inherits.as_deref().filter(|p| !p.is_empty()) {
                Some(parent) => current = parent.to_uppercase(),
                None => return Ok(()),
            }
        }
    }
}

fn check_pattern(pattern: &str, context: &str) -> Result<()> {
    glob::Pattern::new(&pattern.to_lowercase())
        .map(|_| ())
        .map_err(|e| Error::Policy(format!("{context}: bad pattern '{pattern}': {e}")))
}
