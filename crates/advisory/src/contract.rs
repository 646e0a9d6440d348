//! Intent-proposal contract: the subset of JSON Schema the planner output
//! is held to before full typed validation.
//!
//! Only `required` and `additionalProperties: false` (against `properties`)
//! are enforced here; everything else is the typed validator's job.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;

use wd_domain::error::{Error, Result};

/// Loaded contract schema. An empty contract checks nothing, matching the
/// degraded behavior when the schema file is unavailable.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    required: Vec<String>,
    properties: BTreeSet<String>,
    reject_additional: bool,
}

impl Contract {
    /// Load the contract from disk. Missing or unreadable files degrade to
    /// an empty contract with a warning; shape checks then pass trivially.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => Self::from_value(&value),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "contract schema unparsable");
                    Self::default()
                }
            },
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "contract schema unavailable");
                Self::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let required = value
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        let reject_additional = value
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .map(|allowed| !allowed)
            .unwrap_or(false);
        Self {
            required,
            properties,
            reject_additional,
        }
    }

    /// Check required keys and, when the contract closes the key set,
    /// reject unknown keys.
    pub fn check_shape(&self, proposal: &Value) -> Result<()> {
        let Some(object) = proposal.as_object() else {
            return Err(Error::validation("proposal must be an object"));
        };
        for field in &self.required {
            if !object.contains_key(field) {
                return Err(Error::validation(format!("missing required field: {field}")));
            }
        }
        if self.reject_additional && !self.properties.is_empty() {
            let mut extra: Vec<&str> = object
                .keys()
                .filter(|k| !self.properties.contains(*k))
                .map(String::as_str)
                .collect();
            if !extra.is_empty() {
                extra.sort_unstable();
                return Err(Error::validation(format!(
                    "unexpected fields: {}",
                    extra.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> Contract {
        Contract::from_value(&json!({
            "additionalProperties": false,
            "required": ["request_id", "mode"],
            "properties": {"request_id": {}, "mode": {}, "session_id": {}}
        }))
    }

    #[test]
    fn accepts_complete_shape() {
        contract()
            .check_shape(&json!({"request_id": "r", "mode": "game"}))
            .unwrap();
    }

    #[test]
    fn missing_required_field() {
        let err = contract().check_shape(&json!({"request_id": "r"})).unwrap_err();
        assert!(err.to_string().contains("mode"), "{err}");
    }

    #[test]
    fn unknown_field_rejected_when_closed() {
        let err = contract()
            .check_shape(&json!({"request_id": "r", "mode": "game", "surprise": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("surprise"), "{err}");
    }

    #[test]
    fn non_object_rejected() {
        assert!(contract().check_shape(&json!([1, 2])).is_err());
    }

    #[test]
    fn empty_contract_checks_nothing() {
        Contract::default()
            .check_shape(&json!({"anything": "goes"}))
            .unwrap();
    }

    #[test]
    fn bundled_contract_parses() {
        let value: Value =
            serde_json::from_str(include_str!("../../../contracts/intent_proposal.json")).unwrap();
        let contract = Contract::from_value(&value);
        assert!(contract
            .check_shape(&json!({"schema_version": "1.0"}))
            .is_err());
    }
}
