// SPDX-License-Identifier: MIT

//! Validation mode engine
//!
//! A [`Validator`] checks a record against a [`RecordSchema`] in one of three
//! modes fixed at construction:
//! - `Strict` raises on the first failed validation
//! - `Retry` re-prompts a model with the violations, a bounded number of times
//! - `BestEffort` applies two passes of mechanical repair
//!
//! [`RecordSchema`]: crate::strata::schema::RecordSchema

mod engine;
mod feedback;
mod mechanical;
mod rules;

pub use engine::Validator;
pub use feedback::{build_parse_error_feedback, build_validation_feedback};
pub use rules::SemanticRule;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// How schema violations are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Strict,
    Retry,
    BestEffort,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Retry => "retry",
            ValidationMode::BestEffort => "best_effort",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "retry" => Ok(ValidationMode::Retry),
            "best_effort" => Ok(ValidationMode::BestEffort),
            other => Err(format!(
                "unknown validation mode '{}' (expected strict, retry or best_effort)",
                other
            )),
        }
    }
}

/// How a record came to be valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    RepairedAfterRetries(usize),
    BestEffortRepaired,
    BestEffortWithTypeDefaults,
}

impl ValidationOutcome {
    pub fn tag(&self) -> String {
        match self {
            ValidationOutcome::Valid => "valid".to_string(),
            ValidationOutcome::RepairedAfterRetries(n) => format!("repaired_after_{}_retries", n),
            ValidationOutcome::BestEffortRepaired => "best_effort_repaired".to_string(),
            ValidationOutcome::BestEffortWithTypeDefaults => {
                "best_effort_repaired_with_type_defaults".to_string()
            }
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl Serialize for ValidationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

/// Field name to the repair actions applied to it
///
/// Several actions on one field are joined with `+`, e.g.
/// `coerced_to_float+clamped_to_max_1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepairRecord(BTreeMap<String, String>);

impl RepairRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, action: impl Into<String>) {
        let action = action.into();
        self.0
            .entry(field.to_string())
            .and_modify(|existing| {
                existing.push('+');
                existing.push_str(&action);
            })
            .or_insert(action);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Attached to state under `validation_metadata`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetadata {
    pub mode: ValidationMode,
    pub outcome: ValidationOutcome,
    pub repairs: RepairRecord,
    pub retries: usize,
    pub original_keys: Vec<String>,
    pub validated_keys: Vec<String>,
}

/// Result of a successful validation
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub validated: Map<String, Value>,
    pub warnings: Vec<String>,
    pub metadata: ValidationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("best-effort".parse::<ValidationMode>(), Ok(ValidationMode::BestEffort));
        assert_eq!("RETRY".parse::<ValidationMode>(), Ok(ValidationMode::Retry));
        assert!("lenient".parse::<ValidationMode>().is_err());
    }

    #[test]
    fn test_outcome_tags() {
        assert_eq!(ValidationOutcome::Valid.tag(), "valid");
        assert_eq!(
            ValidationOutcome::RepairedAfterRetries(1).tag(),
            "repaired_after_1_retries"
        );
        assert_eq!(
            ValidationOutcome::BestEffortWithTypeDefaults.tag(),
            "best_effort_repaired_with_type_defaults"
        );
    }

    #[test]
    fn test_repair_record_joins_actions() {
        let mut repairs = RepairRecord::new();
        repairs.insert("confidence", "coerced_to_float");
        repairs.insert("confidence", "clamped_to_max_1");
        repairs.insert("category", "used_default");

        assert_eq!(repairs.len(), 2);
        assert_eq!(
            repairs.get("confidence"),
            Some("coerced_to_float+clamped_to_max_1")
        );
        assert_eq!(
            serde_json::to_value(&repairs).unwrap(),
            json!({"category": "used_default", "confidence": "coerced_to_float+clamped_to_max_1"})
        );
    }

    #[test]
    fn test_metadata_serializes_tags() {
        let meta = ValidationMetadata {
            mode: ValidationMode::BestEffort,
            outcome: ValidationOutcome::BestEffortRepaired,
            repairs: RepairRecord::new(),
            retries: 0,
            original_keys: vec!["a".into()],
            validated_keys: vec!["a".into()],
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["mode"], "best_effort");
        assert_eq!(value["outcome"], "best_effort_repaired");
    }
}
