// SPDX-License-Identifier: MIT

//! Field-by-field recovery with regular expressions
//!
//! Last resort when no JSON object can be parsed: each schema field is
//! searched for as `name: value` or `"name": value`, first in the model
//! response and then in the source text.

use regex::Regex;
use serde_json::{Map, Value};

use super::structural;
use crate::strata::schema::{FieldKind, FieldSpec, RecordSchema};

const INT_PATTERN: &str = r"-?\d+";
const FLOAT_PATTERN: &str = r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?";
const BOOL_PATTERN: &str = r"(?i:true|false|yes|no)";
const STRING_PATTERN: &str = r#""(?P<dq>(?:[^"\\]|\\.)*)"|'(?P<sq>[^'\n]*)'|(?P<bare>[^,\n\}\]]+)"#;
const LIST_PATTERN: &str = r"\[[^\]]*\]";
const OBJECT_PATTERN: &str = r"\{[^{}]*\}";

/// Key pattern: optional quotes, case-insensitive, `_` also matches whitespace
///
/// The key must not be the tail of a longer identifier (`score` never
/// matches inside `max_score`).
fn key_pattern(name: &str) -> String {
    let escaped = regex::escape(name).replace('_', r"[_\s]");
    format!(r#"(?i)(?:^|[^A-Za-z0-9_])["']?{}["']?\s*[:=]\s*"#, escaped)
}

fn value_pattern(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Int => INT_PATTERN,
        FieldKind::Float => FLOAT_PATTERN,
        FieldKind::Bool => BOOL_PATTERN,
        FieldKind::String => STRING_PATTERN,
        FieldKind::List => LIST_PATTERN,
        FieldKind::Object => OBJECT_PATTERN,
    }
}

fn field_regex(spec: &FieldSpec) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        "{}(?P<value>{})",
        key_pattern(&spec.name),
        value_pattern(spec.kind)
    ))
}

/// Recover every field that can be found in `texts`, searched in order
pub fn recover(schema: &RecordSchema, texts: &[&str]) -> Result<Map<String, Value>, String> {
    let mut record = Map::new();

    for spec in schema.fields() {
        let re = field_regex(spec).map_err(|e| format!("bad pattern for '{}': {}", spec.name, e))?;
        let found = texts
            .iter()
            .find_map(|text| re.captures(text).and_then(|caps| convert(spec, &caps)));
        if let Some(value) = found {
            log::debug!("Recovered field '{}' by pattern", spec.name);
            record.insert(spec.name.clone(), value);
        }
    }

    if record.is_empty() {
        return Err(format!(
            "no schema field could be recovered (looked for {})",
            schema.field_names().join(", ")
        ));
    }
    Ok(record)
}

/// Turn the matched value text into a typed value
fn convert(spec: &FieldSpec, caps: &regex::Captures<'_>) -> Option<Value> {
    let raw = caps.name("value")?.as_str();

    match spec.kind {
        FieldKind::Int => raw.parse::<i64>().ok().map(Value::from),
        FieldKind::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(Value::from),
        FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldKind::String => {
            let text = caps
                .name("dq")
                .or_else(|| caps.name("sq"))
                .or_else(|| caps.name("bare"))?
                .as_str()
                .trim();
            if text.is_empty() {
                return None;
            }
            Some(Value::String(match_choice(spec, text)))
        }
        FieldKind::List => parse_list(raw),
        FieldKind::Object => structural::repair(raw)
            .ok()
            .map(|r| Value::Object(r.record)),
    }
}

/// Canonical spelling of a choice matched case-insensitively
fn match_choice(spec: &FieldSpec, text: &str) -> String {
    spec.choices
        .as_ref()
        .and_then(|choices| {
            choices
                .iter()
                .find(|c| c.eq_ignore_ascii_case(text))
                .cloned()
        })
        .unwrap_or_else(|| text.to_string())
}

/// A bracketed list as JSON, or as comma-separated bare items
fn parse_list(raw: &str) -> Option<Value> {
    if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
        return Some(value);
    }
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    let items = inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|item| !item.is_empty())
        .map(|item| Value::String(item.to_string()))
        .collect();
    Some(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> RecordSchema {
        RecordSchema::builder("Triage")
            .field(FieldSpec::string("category").choices(["bug", "feature", "question"]))
            .field(FieldSpec::float("confidence"))
            .field(FieldSpec::int("priority_level"))
            .field(FieldSpec::boolean("urgent"))
            .field(FieldSpec::list("tags"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_recover_from_prose() {
        let text = "Category: BUG\nconfidence = 0.85\npriority level: 2\n\
                    urgent: yes\ntags: [login, 'auth']";
        let record = recover(&schema(), &[text]).unwrap();

        assert_eq!(record["category"], "bug");
        assert_eq!(record["confidence"], json!(0.85));
        assert_eq!(record["priority_level"], json!(2));
        assert_eq!(record["urgent"], json!(true));
        assert_eq!(record["tags"], json!(["login", "auth"]));
    }

    #[test]
    fn test_recover_from_broken_json() {
        let text = r#"{"category": "feature", "confidence": 0.4 "tags": ["a", "b"] oops"#;
        let record = recover(&schema(), &[text]).unwrap();
        assert_eq!(record["category"], "feature");
        assert_eq!(record["confidence"], json!(0.4));
        assert_eq!(record["tags"], json!(["a", "b"]));
        assert!(!record.contains_key("urgent"));
    }

    #[test]
    fn test_falls_back_to_second_text() {
        let record = recover(&schema(), &["nothing useful", "urgent: false"]).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record["urgent"], json!(false));
    }

    #[test]
    fn test_key_is_not_matched_inside_longer_key() {
        let schema = RecordSchema::builder("Score")
            .field(FieldSpec::int("score"))
            .build()
            .unwrap();
        let record = recover(&schema, &["max_score: 10, score: 3"]).unwrap();
        assert_eq!(record["score"], json!(3));

        let record = recover(&schema, &[r#"{"max_score": 10, "score": 4"#]).unwrap();
        assert_eq!(record["score"], json!(4));
    }

    #[test]
    fn test_nothing_recovered() {
        let err = recover(&schema(), &["just prose"]).unwrap_err();
        assert!(err.contains("category"));
    }
}
