// SPDX-License-Identifier: MIT

//! Record schemas
//!
//! A [`RecordSchema`] is an explicit, immutable descriptor of the structured
//! record a pipeline extracts: field names, kinds, defaults, numeric bounds
//! and allowed choices. Extraction uses it to build prompts and drive partial
//! recovery; validation uses it to check, repair and clamp.

mod field;
mod validate;

pub use field::{Bounds, FieldKind, FieldSpec, Limit};
pub(crate) use validate::check_value;
pub use validate::{format_violations, Violation, ViolationKind, RECORD_FIELD};

use crate::adk::error::StrataError;
use crate::strata::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Descriptor of a structured record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordSchema {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn builder(name: impl Into<String>) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    /// Parse a schema from YAML
    pub fn from_yaml(content: &str) -> Result<Self, StrataError> {
        let schema: RecordSchema = serde_yaml::from_str(content)?;
        schema.check()?;
        Ok(schema)
    }

    /// Load a schema from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, StrataError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn check(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for spec in &self.fields {
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaError::DuplicateField(spec.name.clone()));
            }
            if !spec.bounds.is_empty() && !spec.kind.is_numeric() {
                return Err(SchemaError::BoundsOnNonNumeric {
                    field: spec.name.clone(),
                    kind: spec.kind,
                });
            }
            if let (Some(lower), Some(upper)) = (spec.bounds.lower(), spec.bounds.upper()) {
                let empty = if lower.exclusive || upper.exclusive {
                    lower.value >= upper.value
                } else {
                    lower.value > upper.value
                };
                if empty {
                    return Err(SchemaError::EmptyRange(spec.name.clone()));
                }
            }
            match &spec.choices {
                Some(_) if spec.kind != FieldKind::String => {
                    return Err(SchemaError::ChoicesOnNonString(spec.name.clone()));
                }
                Some(choices) if choices.is_empty() => {
                    return Err(SchemaError::EmptyChoices(spec.name.clone()));
                }
                _ => {}
            }
            if let Some(default) = &spec.default {
                check_value(spec, default).map_err(|kind| SchemaError::InvalidDefault {
                    field: spec.name.clone(),
                    reason: Violation::new(&spec.name, kind).to_string(),
                })?;
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Field listing for extraction and repair prompts
    pub fn describe(&self) -> String {
        let mut out = format!("Record: {}", self.name);
        if let Some(desc) = &self.description {
            out.push_str(" - ");
            out.push_str(desc);
        }
        out.push_str("\nFields:");
        for spec in &self.fields {
            out.push_str("\n- ");
            out.push_str(&spec.summary());
        }
        out
    }

    /// JSON Schema rendition, for models that understand it better than prose
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for spec in &self.fields {
            let type_name = match spec.kind {
                FieldKind::String => "string",
                FieldKind::Int => "integer",
                FieldKind::Float => "number",
                FieldKind::Bool => "boolean",
                FieldKind::List => "array",
                FieldKind::Object => "object",
            };
            let mut prop = Map::new();
            if spec.nullable {
                prop.insert("type".into(), json!([type_name, "null"]));
            } else {
                prop.insert("type".into(), json!(type_name));
            }
            if let Some(desc) = &spec.description {
                prop.insert("description".into(), json!(desc));
            }
            if let Some(choices) = &spec.choices {
                prop.insert("enum".into(), json!(choices));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".into(), default.clone());
            }
            let bounds = &spec.bounds;
            for (key, bound) in [
                ("minimum", bounds.ge),
                ("exclusiveMinimum", bounds.gt),
                ("maximum", bounds.le),
                ("exclusiveMaximum", bounds.lt),
            ] {
                if let Some(b) = bound {
                    prop.insert(key.into(), json!(b));
                }
            }
            if spec.is_required() {
                required.push(spec.name.clone());
            }
            properties.insert(spec.name.clone(), Value::Object(prop));
        }

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Fluent builder; `build` runs the same consistency checks as the YAML loader
#[derive(Debug, Clone)]
pub struct RecordSchemaBuilder {
    name: String,
    description: Option<String>,
    fields: Vec<FieldSpec>,
}

impl RecordSchemaBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn build(self) -> Result<RecordSchema, SchemaError> {
        let schema = RecordSchema {
            name: self.name,
            description: self.description,
            fields: self.fields,
        };
        schema.check()?;
        Ok(schema)
    }
}
