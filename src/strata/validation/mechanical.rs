// SPDX-License-Identifier: MIT

//! Mechanical, domain-agnostic repairs for BEST_EFFORT validation
//!
//! The first pass uses schema defaults, lossless coercion, choice
//! normalization and clamping. The second pass is strictly more permissive:
//! type-based defaults for whatever is still missing and lossy coercion.

use serde_json::{Map, Value};

use super::RepairRecord;
use crate::strata::schema::{check_value, FieldKind, FieldSpec, RecordSchema, ViolationKind};

/// Defaults, lossless coercion, choice normalization, clamping
pub(crate) fn first_pass(
    schema: &RecordSchema,
    record: &Map<String, Value>,
    repairs: &mut RepairRecord,
) -> Map<String, Value> {
    let mut out = record.clone();
    for spec in schema.fields() {
        let value = match out.get(&spec.name) {
            None => match &spec.default {
                Some(default) => {
                    repairs.insert(&spec.name, "used_default");
                    default.clone()
                }
                None => continue,
            },
            Some(Value::Null) if !spec.nullable => match &spec.default {
                Some(default) => {
                    repairs.insert(&spec.name, "used_default");
                    default.clone()
                }
                None => continue,
            },
            Some(value) => value.clone(),
        };

        let value = coerce(spec, value, repairs, coerce_lossless);
        let value = settle(spec, value, repairs);
        out.insert(spec.name.clone(), value);
    }
    out
}

/// Type defaults for remaining gaps, lossy coercion for remaining type errors
pub(crate) fn second_pass(
    schema: &RecordSchema,
    mut record: Map<String, Value>,
    repairs: &mut RepairRecord,
) -> Map<String, Value> {
    for spec in schema.fields() {
        let value = match record.get(&spec.name) {
            None if spec.fallback().is_none() => {
                repairs.insert(&spec.name, "used_type_default");
                type_fallback(spec)
            }
            Some(Value::Null) if !spec.nullable => {
                repairs.insert(&spec.name, "used_type_default");
                type_fallback(spec)
            }
            Some(value) => {
                let value = coerce(spec, value.clone(), repairs, coerce_lossy);
                settle(spec, value, repairs)
            }
            None => continue,
        };
        record.insert(spec.name.clone(), value);
    }
    record
}

/// Apply `convert` when the value has the wrong type for its field
fn coerce(
    spec: &FieldSpec,
    value: Value,
    repairs: &mut RepairRecord,
    convert: fn(FieldKind, &Value) -> Option<Value>,
) -> Value {
    if !matches!(check_value(spec, &value), Err(ViolationKind::WrongType { .. })) {
        return value;
    }
    match convert(spec.kind, &value) {
        Some(coerced) => {
            repairs.insert(&spec.name, format!("coerced_to_{}", spec.kind));
            coerced
        }
        None => value,
    }
}

/// Conversions that lose no information
fn coerce_lossless(kind: FieldKind, value: &Value) -> Option<Value> {
    match (kind, value) {
        (FieldKind::Int, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .map(Value::from)
        }
        (FieldKind::Int, Value::Number(n)) => n.as_f64().and_then(integral).map(Value::from),
        (FieldKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(Value::from),
        (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (FieldKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldKind::Bool, Value::Number(n)) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(Value::Bool(true)),
            Some(x) if x == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldKind::List, Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(list @ Value::Array(_)) => Some(list),
            _ => None,
        },
        (FieldKind::Object, Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(object @ Value::Object(_)) => Some(object),
            _ => None,
        },
        _ => None,
    }
}

/// Lossless conversions first, then rounding, stringifying and wrapping
fn coerce_lossy(kind: FieldKind, value: &Value) -> Option<Value> {
    if let Some(v) = coerce_lossless(kind, value) {
        return Some(v);
    }
    match (kind, value) {
        (FieldKind::Int, Value::Number(n)) => n.as_f64().map(|x| Value::from(x.round() as i64)),
        (FieldKind::Int, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(|x| Value::from(x.round() as i64)),
        (FieldKind::String, other) => Some(Value::String(other.to_string())),
        (FieldKind::List, other) => Some(Value::Array(vec![other.clone()])),
        _ => None,
    }
}

fn integral(x: f64) -> Option<i64> {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        Some(x as i64)
    } else {
        None
    }
}

/// Choice normalization, then clamping
fn settle(spec: &FieldSpec, value: Value, repairs: &mut RepairRecord) -> Value {
    if let Some(choices) = &spec.choices {
        if let Some(s) = value.as_str() {
            if !choices.iter().any(|c| c == s) {
                let wanted = s.trim();
                if let Some(choice) = choices.iter().find(|c| c.eq_ignore_ascii_case(wanted)) {
                    repairs.insert(&spec.name, "normalized_choice");
                    return Value::String(choice.clone());
                }
            }
        }
        return value;
    }

    if spec.kind.is_numeric() {
        if let Some(x) = value.as_f64() {
            if let Some((clamped, action)) = clamp(spec, x) {
                repairs.insert(&spec.name, action);
                return clamped;
            }
        }
    }
    value
}

/// The nearest in-bounds value and the action tag, when `x` is out of bounds
fn clamp(spec: &FieldSpec, x: f64) -> Option<(Value, String)> {
    let int = spec.kind == FieldKind::Int;

    if let Some(limit) = spec.bounds.below_lower(x) {
        let target = match (int, limit.exclusive) {
            (false, false) => limit.value,
            (false, true) => next_up(limit.value),
            (true, false) => limit.value.ceil(),
            (true, true) => limit.value.floor() + 1.0,
        };
        return Some((
            number(target, int),
            format!("clamped_to_min_{}", limit.value),
        ));
    }
    if let Some(limit) = spec.bounds.above_upper(x) {
        let target = match (int, limit.exclusive) {
            (false, false) => limit.value,
            (false, true) => next_down(limit.value),
            (true, false) => limit.value.floor(),
            (true, true) => limit.value.ceil() - 1.0,
        };
        return Some((
            number(target, int),
            format!("clamped_to_max_{}", limit.value),
        ));
    }
    None
}

fn number(x: f64, int: bool) -> Value {
    if int {
        Value::from(x as i64)
    } else {
        Value::from(x)
    }
}

/// Smallest f64 greater than `x`
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Largest f64 less than `x`
fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// Type-based default for a field: first choice, or the kind's zero value
/// moved into bounds
fn type_fallback(spec: &FieldSpec) -> Value {
    if let Some(first) = spec.choices.as_ref().and_then(|c| c.first()) {
        return Value::String(first.clone());
    }
    let zero = spec.kind.type_default();
    if spec.kind.is_numeric() {
        if let Some((clamped, _)) = zero.as_f64().and_then(|x| clamp(spec, x)) {
            return clamped;
        }
    }
    zero
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> RecordSchema {
        RecordSchema::builder("Triage")
            .field(FieldSpec::string("category").choices(["bug", "feature"]))
            .field(FieldSpec::float("confidence").ge(0.0).le(1.0))
            .field(FieldSpec::int("priority").ge(1.0).le(5.0).with_default(json!(3)))
            .field(FieldSpec::boolean("urgent"))
            .build()
            .unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_clamp_to_exact_bound() {
        let mut repairs = RepairRecord::new();
        let out = first_pass(&schema(), &obj(json!({"confidence": 1.5})), &mut repairs);
        assert_eq!(out["confidence"], json!(1.0));
        assert_eq!(repairs.get("confidence"), Some("clamped_to_max_1"));
    }

    #[test]
    fn test_coercion_then_clamp_is_joined() {
        let mut repairs = RepairRecord::new();
        let out = first_pass(&schema(), &obj(json!({"confidence": "-0.2"})), &mut repairs);
        assert_eq!(out["confidence"], json!(0.0));
        assert_eq!(
            repairs.get("confidence"),
            Some("coerced_to_float+clamped_to_min_0")
        );
    }

    #[test]
    fn test_defaults_choices_and_bools() {
        let mut repairs = RepairRecord::new();
        let out = first_pass(
            &schema(),
            &obj(json!({"category": " Bug ", "priority": null, "urgent": "yes"})),
            &mut repairs,
        );
        assert_eq!(out["category"], "bug");
        assert_eq!(out["priority"], json!(3));
        assert_eq!(out["urgent"], json!(true));
        assert_eq!(repairs.get("category"), Some("normalized_choice"));
        assert_eq!(repairs.get("priority"), Some("used_default"));
        assert_eq!(repairs.get("urgent"), Some("coerced_to_bool"));
    }

    #[test]
    fn test_lossless_pass_leaves_fractional_int() {
        let mut repairs = RepairRecord::new();
        let out = first_pass(&schema(), &obj(json!({"priority": 2.5})), &mut repairs);
        assert_eq!(out["priority"], json!(2.5));
        assert!(repairs.get("priority").is_none());

        let out = second_pass(&schema(), out, &mut repairs);
        assert_eq!(out["priority"], json!(3));
        assert_eq!(repairs.get("priority"), Some("coerced_to_int"));
    }

    #[test]
    fn test_second_pass_type_defaults() {
        let mut repairs = RepairRecord::new();
        let out = second_pass(&schema(), Map::new(), &mut repairs);
        assert_eq!(out["category"], "bug");
        assert_eq!(out["confidence"], json!(0.0));
        assert_eq!(out["urgent"], json!(false));
        assert!(!out.contains_key("priority"));
        assert_eq!(repairs.get("category"), Some("used_type_default"));
    }

    #[test]
    fn test_exclusive_bounds_step_inside() {
        let spec = FieldSpec::float("ratio").gt(0.0).lt(1.0);
        let (low, _) = clamp(&spec, -3.0).unwrap();
        let (high, tag) = clamp(&spec, 4.0).unwrap();
        assert!(low.as_f64().unwrap() > 0.0);
        assert!(high.as_f64().unwrap() < 1.0);
        assert!(spec.bounds.contains(low.as_f64().unwrap()));
        assert!(spec.bounds.contains(high.as_f64().unwrap()));
        assert_eq!(tag, "clamped_to_max_1");

        let int_spec = FieldSpec::int("n").gt(2.0).lt(7.0);
        assert_eq!(clamp(&int_spec, 0.0).unwrap().0, json!(3));
        assert_eq!(clamp(&int_spec, 9.0).unwrap().0, json!(6));
    }

    #[test]
    fn test_type_default_moved_into_bounds() {
        let spec = FieldSpec::int("priority").ge(1.0).le(5.0);
        assert_eq!(type_fallback(&spec), json!(1));
    }
}
