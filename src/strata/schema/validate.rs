// SPDX-License-Identifier: MIT

//! Record validation against a [`RecordSchema`]

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::field::{FieldKind, FieldSpec};
use super::RecordSchema;
use crate::strata::state::json_type_name;

/// Field name used for violations that concern the record as a whole
pub const RECORD_FIELD: &str = "<record>";

/// One way in which a record fails its schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub field: String,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    NotAnObject {
        found: String,
    },
    Missing,
    UnexpectedNull,
    WrongType {
        expected: FieldKind,
        found: String,
    },
    BelowMinimum {
        bound: f64,
        exclusive: bool,
        actual: f64,
    },
    AboveMaximum {
        bound: f64,
        exclusive: bool,
        actual: f64,
    },
    NotAChoice {
        value: String,
        choices: Vec<String>,
    },
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, ViolationKind::Missing)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::NotAnObject { found } => {
                write!(f, "expected a JSON object, found {}", found)
            }
            ViolationKind::Missing => write!(f, "field '{}': missing required field", self.field),
            ViolationKind::UnexpectedNull => {
                write!(f, "field '{}': null is not allowed", self.field)
            }
            ViolationKind::WrongType { expected, found } => write!(
                f,
                "field '{}': expected {}, found {}",
                self.field, expected, found
            ),
            ViolationKind::BelowMinimum {
                bound,
                exclusive,
                actual,
            } => {
                let op = if *exclusive { ">" } else { ">=" };
                write!(f, "field '{}': {} must be {} {}", self.field, actual, op, bound)
            }
            ViolationKind::AboveMaximum {
                bound,
                exclusive,
                actual,
            } => {
                let op = if *exclusive { "<" } else { "<=" };
                write!(f, "field '{}': {} must be {} {}", self.field, actual, op, bound)
            }
            ViolationKind::NotAChoice { value, choices } => write!(
                f,
                "field '{}': '{}' is not one of [{}]",
                self.field,
                value,
                choices.join(", ")
            ),
        }
    }
}

/// Join violations into a single line for error messages
pub fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl RecordSchema {
    /// Validate a record, returning the normalized record or every violation
    ///
    /// The normalized record contains exactly the schema's fields: unknown
    /// keys are dropped, absent optional fields take their fallback, and
    /// integers given for float fields become floats.
    pub fn validate(&self, record: &Value) -> Result<Map<String, Value>, Vec<Violation>> {
        let object = match record {
            Value::Object(map) => map,
            other => {
                return Err(vec![Violation::new(
                    RECORD_FIELD,
                    ViolationKind::NotAnObject {
                        found: json_type_name(other).to_string(),
                    },
                )])
            }
        };

        let mut validated = Map::new();
        let mut violations = Vec::new();

        for spec in self.fields() {
            let checked = match object.get(&spec.name) {
                None => spec.fallback().ok_or(ViolationKind::Missing),
                Some(value) => check_value(spec, value),
            };
            match checked {
                Ok(value) => {
                    validated.insert(spec.name.clone(), value);
                }
                Err(kind) => violations.push(Violation::new(&spec.name, kind)),
            }
        }

        if violations.is_empty() {
            Ok(validated)
        } else {
            Err(violations)
        }
    }
}

/// Check one present value against its field, returning the normalized value
pub(crate) fn check_value(spec: &FieldSpec, value: &Value) -> Result<Value, ViolationKind> {
    if value.is_null() {
        return if spec.nullable {
            Ok(Value::Null)
        } else {
            Err(ViolationKind::UnexpectedNull)
        };
    }

    let wrong_type = || ViolationKind::WrongType {
        expected: spec.kind,
        found: json_type_name(value).to_string(),
    };

    let normalized = match spec.kind {
        FieldKind::String => {
            let s = value.as_str().ok_or_else(wrong_type)?;
            if let Some(choices) = &spec.choices {
                if !choices.iter().any(|c| c == s) {
                    return Err(ViolationKind::NotAChoice {
                        value: s.to_string(),
                        choices: choices.clone(),
                    });
                }
            }
            value.clone()
        }
        FieldKind::Int => {
            if !(value.is_i64() || value.is_u64()) {
                return Err(wrong_type());
            }
            value.clone()
        }
        FieldKind::Float => {
            let x = value.as_f64().ok_or_else(wrong_type)?;
            Value::from(x)
        }
        FieldKind::Bool => {
            if !value.is_boolean() {
                return Err(wrong_type());
            }
            value.clone()
        }
        FieldKind::List => {
            if !value.is_array() {
                return Err(wrong_type());
            }
            value.clone()
        }
        FieldKind::Object => {
            if !value.is_object() {
                return Err(wrong_type());
            }
            value.clone()
        }
    };

    if spec.kind.is_numeric() {
        if let Some(x) = normalized.as_f64() {
            if let Some(limit) = spec.bounds.below_lower(x) {
                return Err(ViolationKind::BelowMinimum {
                    bound: limit.value,
                    exclusive: limit.exclusive,
                    actual: x,
                });
            }
            if let Some(limit) = spec.bounds.above_upper(x) {
                return Err(ViolationKind::AboveMaximum {
                    bound: limit.value,
                    exclusive: limit.exclusive,
                    actual: x,
                });
            }
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strata::schema::FieldSpec;
    use serde_json::json;

    fn triage_schema() -> RecordSchema {
        RecordSchema::builder("Triage")
            .field(FieldSpec::string("category").choices(["bug", "feature", "question"]))
            .field(FieldSpec::float("confidence").ge(0.0).le(1.0))
            .field(FieldSpec::int("priority").ge(1.0).le(5.0).with_default(json!(3)))
            .field(FieldSpec::string("note").nullable())
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_record_is_normalized() {
        let schema = triage_schema();
        let record = json!({"category": "bug", "confidence": 1, "extra": true});
        let validated = schema.validate(&record).unwrap();

        assert_eq!(validated["category"], "bug");
        assert_eq!(validated["confidence"], json!(1.0));
        assert_eq!(validated["priority"], json!(3));
        assert_eq!(validated["note"], Value::Null);
        assert!(!validated.contains_key("extra"));
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let schema = triage_schema();
        let violations = schema.validate(&json!({"confidence": 0.4})).unwrap_err();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "category");
        assert!(violations[0].is_missing());
        assert_eq!(
            violations[0].to_string(),
            "field 'category': missing required field"
        );
    }

    #[test]
    fn test_bound_violations() {
        let schema = triage_schema();
        let violations = schema
            .validate(&json!({"category": "bug", "confidence": 1.5, "priority": 0}))
            .unwrap_err();

        assert_eq!(violations.len(), 2);
        assert!(matches!(
            violations[0].kind,
            ViolationKind::AboveMaximum { bound, .. } if bound == 1.0
        ));
        assert!(matches!(
            violations[1].kind,
            ViolationKind::BelowMinimum { bound, .. } if bound == 1.0
        ));
        assert_eq!(
            violations[0].to_string(),
            "field 'confidence': 1.5 must be <= 1"
        );
    }

    #[test]
    fn test_wrong_types_and_choices() {
        let schema = triage_schema();
        let violations = schema
            .validate(&json!({"category": "outage", "confidence": "high", "priority": 2.5}))
            .unwrap_err();

        let kinds: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(kinds, vec!["category", "confidence", "priority"]);
        assert!(matches!(
            violations[0].kind,
            ViolationKind::NotAChoice { .. }
        ));
        assert!(matches!(
            violations[2].kind,
            ViolationKind::WrongType {
                expected: FieldKind::Int,
                ..
            }
        ));
    }

    #[test]
    fn test_null_for_non_nullable_field() {
        let schema = triage_schema();
        let violations = schema
            .validate(&json!({"category": null, "confidence": 0.2}))
            .unwrap_err();
        assert_eq!(violations[0].kind, ViolationKind::UnexpectedNull);
    }

    #[test]
    fn test_non_object_record() {
        let schema = triage_schema();
        let violations = schema.validate(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(violations[0].field, RECORD_FIELD);
        assert!(format_violations(&violations).contains("found array"));
    }
}
