// SPDX-License-Identifier: MIT

//! Semantic rules: named checks over a schema-valid record
//!
//! A failed rule never fails validation; it becomes a warning.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

type RuleFn = dyn Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync;

#[derive(Clone)]
pub struct SemanticRule {
    name: String,
    check: Arc<RuleFn>,
}

impl SemanticRule {
    /// Rule whose check explains its own failures
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Rule from a boolean predicate and a fixed failure message
    pub fn predicate<F>(name: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        Self::new(name, move |record| {
            if predicate(record) {
                Ok(())
            } else {
                Err(message.clone())
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The warning to record, if the rule fails
    pub fn evaluate(&self, record: &Map<String, Value>) -> Option<String> {
        (self.check)(record)
            .err()
            .map(|reason| format!("semantic rule '{}' failed: {}", self.name, reason))
    }
}

impl fmt::Debug for SemanticRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
