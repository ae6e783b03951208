// SPDX-License-Identifier: MIT

//! Runtime state storage for pipeline execution

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::schema::{json_type_name, FieldType, ReducerType, StateSchema};
use super::update::{StateUpdate, UpdateEntry, UpdateOp};
use crate::strata::error::StateError;

/// Owner recorded for keys supplied by the caller of `invoke`
pub const INPUT_OWNER: &str = "input";

/// Runtime pipeline state with reducer support and key ownership
///
/// One instance belongs to exactly one run. Keys are never removed; a key
/// written with [`UpdateOp::Set`] belongs to its first writer and only that
/// writer may rewrite it. Schema defaults are unowned.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    fields: HashMap<String, Value>,
    reducers: HashMap<String, ReducerType>,
    types: HashMap<String, FieldType>,
    owners: HashMap<String, String>,
}

impl PipelineState {
    /// Create a new PipelineState seeded from a schema
    pub fn new(schema: &StateSchema) -> Self {
        let mut state = Self::empty();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                state.fields.insert(name.clone(), default.clone());
            }
            state.reducers.insert(name.clone(), def.reducer);
            state.types.insert(name.clone(), def.field_type);
        }

        state
    }

    /// Create an empty PipelineState
    pub fn empty() -> Self {
        Self {
            fields: HashMap::new(),
            reducers: HashMap::new(),
            types: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Seed a state from the schema and overlay the caller's input object
    pub fn from_input(schema: &StateSchema, input: Value) -> Result<Self, StateError> {
        let object = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(StateError::NotAnObject(json_type_name(&other).to_string())),
        };

        let mut state = Self::new(schema);
        for (key, value) in object {
            state.check_type(&key, &value)?;
            state.owners.insert(key.clone(), INPUT_OWNER.to_string());
            state.fields.insert(key, value);
        }
        Ok(state)
    }

    /// Insert a caller-owned value (builder style, for standalone node runs)
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        self.owners.insert(key.clone(), INPUT_OWNER.to_string());
        self.fields.insert(key, value);
        self
    }

    /// Apply a node's update atomically: every entry is checked before any is written
    pub fn apply(&mut self, writer: &str, update: StateUpdate) -> Result<Vec<String>, StateError> {
        for entry in update.entries() {
            self.check_entry(writer, entry)?;
        }

        let written: Vec<String> = update.keys().into_iter().map(String::from).collect();
        for entry in update.into_entries() {
            match entry.op {
                UpdateOp::Set => {
                    self.owners
                        .entry(entry.key.clone())
                        .or_insert_with(|| writer.to_string());
                    self.write(&entry.key, entry.value);
                }
                UpdateOp::Append => {
                    self.owners
                        .entry(entry.key.clone())
                        .or_insert_with(|| writer.to_string());
                    self.append(&entry.key, entry.value);
                }
            }
        }
        Ok(written)
    }

    fn check_entry(&self, writer: &str, entry: &UpdateEntry) -> Result<(), StateError> {
        match entry.op {
            UpdateOp::Set => {
                if let Some(owner) = self.owners.get(&entry.key) {
                    if owner != writer {
                        return Err(StateError::ForeignWrite {
                            key: entry.key.clone(),
                            owner: owner.clone(),
                            writer: writer.to_string(),
                        });
                    }
                }
                if self.reducer(&entry.key) == ReducerType::Append {
                    return Ok(());
                }
                self.check_type(&entry.key, &entry.value)
            }
            UpdateOp::Append => match self.fields.get(&entry.key) {
                None | Some(Value::Array(_)) => Ok(()),
                Some(_) => Err(StateError::AppendToNonList {
                    key: entry.key.clone(),
                }),
            },
        }
    }

    fn check_type(&self, key: &str, value: &Value) -> Result<(), StateError> {
        match self.types.get(key) {
            Some(expected) if !expected.accepts(value) => Err(StateError::TypeMismatch {
                key: key.to_string(),
                expected: *expected,
                found: json_type_name(value).to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn reducer(&self, key: &str) -> ReducerType {
        self.reducers
            .get(key)
            .copied()
            .unwrap_or(ReducerType::Overwrite)
    }

    /// Write a field using the appropriate reducer
    fn write(&mut self, key: &str, value: Value) {
        match self.reducer(key) {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => self.append(key, value),
            ReducerType::Merge => {
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (current, value) {
                    (Value::Object(current_obj), Value::Object(new_obj)) => {
                        for (k, v) in new_obj {
                            current_obj.insert(k, v);
                        }
                    }
                    (slot, other) => *slot = other,
                }
            }
        }
    }

    fn append(&mut self, key: &str, value: Value) {
        let arr = self
            .fields
            .entry(key.to_string())
            .or_insert(Value::Array(vec![]));
        if let Value::Array(a) = arr {
            match value {
                Value::Array(new_items) => a.extend(new_items),
                other => a.push(other),
            }
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a string field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a nested field value using dot notation (e.g., "validated.category")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Who wrote a key first, if anyone
    pub fn owner(&self, key: &str) -> Option<&str> {
        self.owners.get(key).map(String::as_str)
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Get all field names, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strata::state::schema::StateFieldDef;
    use serde_json::json;

    fn make_schema(fields: Vec<(&str, FieldType, ReducerType, Option<Value>)>) -> StateSchema {
        let mut schema = StateSchema::default();
        for (name, field_type, reducer, default) in fields {
            schema.fields.insert(
                name.to_string(),
                StateFieldDef {
                    field_type,
                    reducer,
                    default,
                },
            );
        }
        schema
    }

    #[test]
    fn test_empty_state() {
        let state = PipelineState::empty();
        assert!(state.get("anything").is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_with_defaults_is_unowned() {
        let schema = make_schema(vec![(
            "count",
            FieldType::Number,
            ReducerType::Overwrite,
            Some(json!(0)),
        )]);
        let mut state = PipelineState::new(&schema);
        assert_eq!(state.get("count"), Some(&json!(0)));
        assert!(state.owner("count").is_none());

        state
            .apply("counter", StateUpdate::new().set("count", json!(5)))
            .unwrap();
        assert_eq!(state.get("count"), Some(&json!(5)));
        assert_eq!(state.owner("count"), Some("counter"));
    }

    #[test]
    fn test_from_input_marks_input_owner() {
        let state =
            PipelineState::from_input(&StateSchema::default(), json!({"ticket": "T-1"})).unwrap();
        assert_eq!(state.get_str("ticket"), Some("T-1"));
        assert_eq!(state.owner("ticket"), Some(INPUT_OWNER));
    }

    #[test]
    fn test_from_input_rejects_non_object() {
        let err = PipelineState::from_input(&StateSchema::default(), json!([1, 2])).unwrap_err();
        assert!(matches!(err, StateError::NotAnObject(_)));
    }

    #[test]
    fn test_from_input_checks_declared_types() {
        let schema = StateSchema::new().field("ticket", FieldType::String);
        let err = PipelineState::from_input(&schema, json!({"ticket": 7})).unwrap_err();
        assert!(matches!(err, StateError::TypeMismatch { .. }));
    }

    #[test]
    fn test_owner_may_rewrite_own_key() {
        let mut state = PipelineState::empty();
        state
            .apply("a", StateUpdate::new().set("value", json!("first")))
            .unwrap();
        state
            .apply("a", StateUpdate::new().set("value", json!("second")))
            .unwrap();
        assert_eq!(state.get("value"), Some(&json!("second")));
    }

    #[test]
    fn test_foreign_write_is_rejected_atomically() {
        let mut state = PipelineState::empty().with_value("input_text", json!("hello"));
        let update = StateUpdate::new()
            .set("fresh", json!(1))
            .set("input_text", json!("overwritten"));

        let err = state.apply("node", update).unwrap_err();
        match err {
            StateError::ForeignWrite { key, owner, writer } => {
                assert_eq!(key, "input_text");
                assert_eq!(owner, INPUT_OWNER);
                assert_eq!(writer, "node");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Nothing from the rejected update was written
        assert!(state.get("fresh").is_none());
        assert_eq!(state.get_str("input_text"), Some("hello"));
    }

    #[test]
    fn test_append_is_shared() {
        let mut state = PipelineState::empty();
        state
            .apply("a", StateUpdate::new().append("history", json!("m1")))
            .unwrap();
        state
            .apply("b", StateUpdate::new().append("history", json!(["m2", "m3"])))
            .unwrap();
        assert_eq!(state.get("history"), Some(&json!(["m1", "m2", "m3"])));
    }

    #[test]
    fn test_append_to_scalar_fails() {
        let mut state = PipelineState::empty().with_value("name", json!("x"));
        let err = state
            .apply("a", StateUpdate::new().append("name", json!("y")))
            .unwrap_err();
        assert!(matches!(err, StateError::AppendToNonList { .. }));
    }

    #[test]
    fn test_merge_reducer() {
        let schema = make_schema(vec![("meta", FieldType::Object, ReducerType::Merge, None)]);
        let mut state = PipelineState::new(&schema);

        state
            .apply("n", StateUpdate::new().set("meta", json!({"a": 1})))
            .unwrap();
        state
            .apply("n", StateUpdate::new().set("meta", json!({"b": 2})))
            .unwrap();
        assert_eq!(state.get("meta"), Some(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_declared_type_mismatch_on_set() {
        let schema = StateSchema::new().field("analysis", FieldType::String);
        let mut state = PipelineState::new(&schema);
        let err = state
            .apply("n", StateUpdate::new().set("analysis", json!({"not": "text"})))
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::TypeMismatch {
                expected: FieldType::String,
                ..
            }
        ));
    }

    #[test]
    fn test_get_path() {
        let state = PipelineState::empty().with_value("result", json!({"data": {"value": 42}}));

        assert_eq!(state.get_path("result.data"), Some(&json!({"value": 42})));
        assert_eq!(state.get_path("result.data.value"), Some(&json!(42)));
        assert_eq!(state.get_path("result.nonexistent"), None);
    }

    #[test]
    fn test_to_json_and_keys() {
        let state = PipelineState::empty()
            .with_value("b", json!("hello"))
            .with_value("a", json!(1));

        let json = state.to_json();
        assert_eq!(json["a"], 1);
        assert_eq!(json["b"], "hello");
        assert_eq!(state.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
