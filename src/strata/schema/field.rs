// SPDX-License-Identifier: MIT

//! Field descriptors: kind, default, bounds and choices

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Semantic type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[serde(alias = "str")]
    String,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "number")]
    Float,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "array")]
    List,
    #[serde(alias = "dict")]
    Object,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Float)
    }

    /// Zero value used when nothing better is known
    pub fn type_default(&self) -> Value {
        match self {
            FieldKind::String => Value::String(String::new()),
            FieldKind::Int => Value::from(0),
            FieldKind::Float => Value::from(0.0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::List => Value::Array(vec![]),
            FieldKind::Object => Value::Object(serde_json::Map::new()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
            FieldKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Numeric bounds. `ge`/`le` are inclusive, `gt`/`lt` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
}

/// One side of a bound: the limit and whether it is exclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub value: f64,
    pub exclusive: bool,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.ge.is_none() && self.gt.is_none() && self.le.is_none() && self.lt.is_none()
    }

    /// The tightest lower limit
    pub fn lower(&self) -> Option<Limit> {
        tighter(
            self.ge.map(|value| Limit {
                value,
                exclusive: false,
            }),
            self.gt.map(|value| Limit {
                value,
                exclusive: true,
            }),
            |a, b| a > b,
        )
    }

    /// The tightest upper limit
    pub fn upper(&self) -> Option<Limit> {
        tighter(
            self.le.map(|value| Limit {
                value,
                exclusive: false,
            }),
            self.lt.map(|value| Limit {
                value,
                exclusive: true,
            }),
            |a, b| a < b,
        )
    }

    pub fn below_lower(&self, x: f64) -> Option<Limit> {
        self.lower()
            .filter(|l| if l.exclusive { x <= l.value } else { x < l.value })
    }

    pub fn above_upper(&self, x: f64) -> Option<Limit> {
        self.upper()
            .filter(|l| if l.exclusive { x >= l.value } else { x > l.value })
    }

    pub fn contains(&self, x: f64) -> bool {
        self.below_lower(x).is_none() && self.above_upper(x).is_none()
    }

    /// Human-readable form, e.g. `0 <= x <= 1`
    pub fn describe(&self) -> Option<String> {
        let lower = self.lower().map(|l| {
            let op = if l.exclusive { "<" } else { "<=" };
            format!("{} {} ", l.value, op)
        });
        let upper = self.upper().map(|u| {
            let op = if u.exclusive { "<" } else { "<=" };
            format!(" {} {}", op, u.value)
        });
        match (lower, upper) {
            (None, None) => None,
            (l, u) => Some(format!(
                "{}x{}",
                l.unwrap_or_default(),
                u.unwrap_or_default()
            )),
        }
    }
}

fn tighter(
    inclusive: Option<Limit>,
    exclusive: Option<Limit>,
    stricter: impl Fn(f64, f64) -> bool,
) -> Option<Limit> {
    match (inclusive, exclusive) {
        (Some(i), Some(e)) => {
            if stricter(i.value, e.value) {
                Some(i)
            } else {
                Some(e)
            }
        }
        (i, e) => i.or(e),
    }
}

/// Descriptor of one record field
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether `null` is an acceptable value
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, flatten)]
    pub bounds: Bounds,
    /// Allowed values for string fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            default: None,
            nullable: false,
            bounds: Bounds::default(),
            choices: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn ge(mut self, bound: f64) -> Self {
        self.bounds.ge = Some(bound);
        self
    }

    pub fn gt(mut self, bound: f64) -> Self {
        self.bounds.gt = Some(bound);
        self
    }

    pub fn le(mut self, bound: f64) -> Self {
        self.bounds.le = Some(bound);
        self
    }

    pub fn lt(mut self, bound: f64) -> Self {
        self.bounds.lt = Some(bound);
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// A field is required when it has neither a default nor accepts null
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.nullable
    }

    /// Value used when the field is absent from a record
    pub fn fallback(&self) -> Option<Value> {
        match &self.default {
            Some(v) => Some(v.clone()),
            None if self.nullable => Some(Value::Null),
            None => None,
        }
    }

    /// One-line description used in prompts
    pub fn summary(&self) -> String {
        let mut facets = vec![self.kind.to_string()];
        if self.is_required() {
            facets.push("required".to_string());
        }
        if let Some(bounds) = self.bounds.describe() {
            facets.push(bounds);
        }
        if let Some(choices) = &self.choices {
            facets.push(format!("one of: {}", choices.join(", ")));
        }
        if let Some(default) = &self.default {
            facets.push(format!("default {}", default));
        }

        let mut line = format!("{} ({})", self.name, facets.join(", "));
        if let Some(desc) = &self.description {
            line.push_str(": ");
            line.push_str(desc);
        }
        line
    }
}
