// SPDX-License-Identifier: MIT

//! Node and workflow error types
//!
//! Every failure a caller can observe from `Workflow::invoke` is a
//! [`WorkflowError`]; node failures arrive wrapped in
//! [`WorkflowError::NodeFailed`] together with the state snapshot and the
//! metrics collected up to the failure.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::adk::error::ModelError;
use crate::strata::node::NodeMetrics;
use crate::strata::repair::StrategyFailure;
use crate::strata::schema::{format_violations, FieldKind, Violation};
use crate::strata::state::FieldType;
use crate::strata::template::TemplateError;
use crate::strata::validation::RepairRecord;

/// Inconsistent record schema definitions
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema '{0}' declares no fields")]
    NoFields(String),

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("field '{field}' has numeric bounds but kind {kind}")]
    BoundsOnNonNumeric { field: String, kind: FieldKind },

    #[error("field '{0}' has bounds that no value can satisfy")]
    EmptyRange(String),

    #[error("field '{0}' declares choices but is not a string")]
    ChoicesOnNonString(String),

    #[error("field '{0}' declares an empty choice list")]
    EmptyChoices(String),

    #[error("default for field '{field}' is invalid: {reason}")]
    InvalidDefault { field: String, reason: String },
}

/// Violations of the state contract
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("'{writer}' may not overwrite key '{key}' owned by '{owner}'")]
    ForeignWrite {
        key: String,
        owner: String,
        writer: String,
    },

    #[error("key '{key}' expects {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: FieldType,
        found: String,
    },

    #[error("cannot append to non-list key '{key}'")]
    AppendToNonList { key: String },

    #[error("state input must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// Record of a single validation attempt in RETRY mode
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 0 is the original record, n is the n-th retry
    pub attempt: usize,
    /// The record that was validated (null when the reply did not parse)
    pub submitted: Value,
    pub errors: Vec<String>,
    /// Raw model reply, absent for the original record
    pub raw_output: Option<String>,
}

/// Errors raised by a single node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Required state keys are absent; raised before any side effect
    #[error("node '{node}' is missing required state keys: {}", .missing.join(", "))]
    Precondition { node: String, missing: Vec<String> },

    #[error("model call failed in node '{node}': {source}")]
    Model {
        node: String,
        #[source]
        source: ModelError,
    },

    #[error("template error in node '{node}': {source}")]
    Template {
        node: String,
        #[source]
        source: TemplateError,
    },

    /// A state value exists but has an unusable shape
    #[error("state key '{key}' is unusable: {message}")]
    InvalidState { key: String, message: String },

    /// Every repair strategy failed to recover a record
    #[error(
        "extraction failed after {} strategies: {original_error} (text: {sample})",
        .attempts.len()
    )]
    ExtractionExhausted {
        original_error: String,
        sample: String,
        attempts: Vec<StrategyFailure>,
    },

    /// STRICT mode: the record does not satisfy the schema
    #[error("schema validation failed: {}", format_violations(.violations))]
    SchemaViolation { violations: Vec<Violation> },

    /// RETRY mode: every re-prompt still produced an invalid record
    #[error("validation still failing after {retries} retries: {}", last_errors(.history))]
    RetryExhausted {
        retries: usize,
        history: Vec<AttemptRecord>,
    },

    /// BEST_EFFORT mode: both mechanical repair passes left the record invalid
    #[error(
        "best-effort repair could not produce a valid record: {}",
        format_violations(.violations)
    )]
    RepairExhausted {
        violations: Vec<Violation>,
        repairs: RepairRecord,
    },

    #[error("node '{node}' completed without writing declared output key '{key}'")]
    MissingOutput { node: String, key: String },

    #[error(transparent)]
    State(#[from] StateError),
}

impl NodeError {
    pub fn precondition(node: impl Into<String>, missing: Vec<String>) -> Self {
        Self::Precondition {
            node: node.into(),
            missing,
        }
    }

    pub fn model(node: impl Into<String>, source: ModelError) -> Self {
        Self::Model {
            node: node.into(),
            source,
        }
    }

    pub fn template(node: impl Into<String>, source: TemplateError) -> Self {
        Self::Template {
            node: node.into(),
            source,
        }
    }
}

fn last_errors(history: &[AttemptRecord]) -> String {
    history
        .last()
        .map(|attempt| attempt.errors.join("; "))
        .unwrap_or_default()
}

/// Everything known about a failed node at the moment it failed
#[derive(Debug)]
pub struct NodeFailure {
    pub workflow: String,
    pub run_id: Uuid,
    pub node: String,
    pub reason: NodeError,
    /// State as it was when the node was called
    pub state: Value,
    /// Metrics of every node visited so far, the failing one last
    pub metrics: Vec<NodeMetrics>,
}

/// Workflow construction and execution errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow has no nodes")]
    Empty,

    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    /// Circular dependency detected in the edge list
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("invalid initial state: {0}")]
    InvalidInput(#[from] StateError),

    #[error("workflow '{workflow}' timed out after {elapsed_ms} ms")]
    Timeout { workflow: String, elapsed_ms: u128 },

    #[error("workflow '{}' failed at node '{}': {}", .0.workflow, .0.node, .0.reason)]
    NodeFailed(Box<NodeFailure>),
}

impl WorkflowError {
    /// Failure details when a node failed
    pub fn failure(&self) -> Option<&NodeFailure> {
        match self {
            WorkflowError::NodeFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strata::schema::ViolationKind;

    #[test]
    fn test_precondition_message_lists_keys() {
        let err = NodeError::precondition("extract", vec!["analysis".into(), "ticket".into()]);
        assert_eq!(
            err.to_string(),
            "node 'extract' is missing required state keys: analysis, ticket"
        );
    }

    #[test]
    fn test_schema_violation_message_names_fields() {
        let err = NodeError::SchemaViolation {
            violations: vec![Violation::new("category", ViolationKind::Missing)],
        };
        assert!(err.to_string().contains("field 'category': missing required field"));
    }

    #[test]
    fn test_retry_exhausted_message_uses_last_attempt() {
        let err = NodeError::RetryExhausted {
            retries: 2,
            history: vec![
                AttemptRecord {
                    attempt: 0,
                    submitted: Value::Null,
                    errors: vec!["first".into()],
                    raw_output: None,
                },
                AttemptRecord {
                    attempt: 2,
                    submitted: Value::Null,
                    errors: vec!["last".into()],
                    raw_output: Some("{}".into()),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "validation still failing after 2 retries: last"
        );
    }

    #[test]
    fn test_state_error_converts_to_node_error() {
        let err: NodeError = StateError::AppendToNonList { key: "k".into() }.into();
        assert!(matches!(err, NodeError::State(_)));
    }
}
