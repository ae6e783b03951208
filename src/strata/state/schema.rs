// SPDX-License-Identifier: MIT

//! State schema definitions
//!
//! The state schema is the documented key→type contract of one workflow:
//! which keys may appear, what JSON type they carry, how writes merge, and
//! which defaults seed a fresh run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Schema defining the pipeline state structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a key (fluent builder)
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            StateFieldDef {
                field_type,
                reducer: ReducerType::default(),
                default: None,
            },
        );
        self
    }

    /// Declare a key with an explicit reducer and optional default
    pub fn field_with(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        reducer: ReducerType,
        default: Option<Value>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            StateFieldDef {
                field_type,
                reducer,
                default,
            },
        );
        self
    }

    /// Keys written by the analyze → extract → validate pipeline
    pub fn analysis_pipeline() -> Self {
        Self::new()
            .field("analysis", FieldType::String)
            .field_with("history", FieldType::Array, ReducerType::Append, None)
            .field("extracted", FieldType::Object)
            .field("extraction_warnings", FieldType::Array)
            .field("validated", FieldType::Object)
            .field("validation_warnings", FieldType::Array)
            .field("validation_metadata", FieldType::Object)
    }

    pub fn get(&self, key: &str) -> Option<&StateFieldDef> {
        self.fields.get(key)
    }
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    pub default: Option<Value>,
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value
    Any,
}

impl FieldType {
    /// Whether a value is acceptable for this type; `null` always is
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Shallow merge objects
    Merge,
}

/// JSON type name used in error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
