// SPDX-License-Identifier: MIT

//! Schema validation as a pipeline stage

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Node, NodeMetrics};
use crate::adk::model::Model;
use crate::strata::error::NodeError;
use crate::strata::schema::RecordSchema;
use crate::strata::state::{PipelineState, StateUpdate};
use crate::strata::validation::{SemanticRule, ValidationMode, Validator};

pub const DEFAULT_VALIDATED_KEY: &str = "validated";
pub const VALIDATION_WARNINGS_KEY: &str = "validation_warnings";
pub const VALIDATION_METADATA_KEY: &str = "validation_metadata";

/// Validates the extracted record in the validator's mode
pub struct ValidationNode {
    name: String,
    validator: Validator,
    required: Vec<String>,
    outputs: Vec<String>,
}

impl ValidationNode {
    pub fn new(name: impl Into<String>, validator: Validator) -> Self {
        let name = name.into();
        Self {
            validator: validator.named(name.clone()),
            name,
            required: vec!["extracted".to_string()],
            outputs: vec![
                DEFAULT_VALIDATED_KEY.to_string(),
                VALIDATION_WARNINGS_KEY.to_string(),
                VALIDATION_METADATA_KEY.to_string(),
            ],
        }
    }

    pub fn strict(name: impl Into<String>, schema: Arc<RecordSchema>) -> Self {
        Self::new(name, Validator::strict(schema))
    }

    pub fn retry(
        name: impl Into<String>,
        schema: Arc<RecordSchema>,
        model: Arc<dyn Model>,
        max_retries: usize,
    ) -> Self {
        Self::new(name, Validator::retry(schema, model, max_retries))
    }

    pub fn best_effort(name: impl Into<String>, schema: Arc<RecordSchema>) -> Self {
        Self::new(name, Validator::best_effort(schema))
    }

    pub fn with_rule(mut self, rule: SemanticRule) -> Self {
        self.validator = self.validator.with_rule(rule);
        self
    }

    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.required = vec![key.into()];
        self
    }

    /// Also moves warnings and metadata to `<key>_warnings` and
    /// `<key>_metadata`
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.outputs[1] = format!("{}_warnings", key);
        self.outputs[2] = format!("{}_metadata", key);
        self.outputs[0] = key;
        self
    }

    pub fn with_warnings_key(mut self, key: impl Into<String>) -> Self {
        self.outputs[1] = key.into();
        self
    }

    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.outputs[2] = key.into();
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.validator.mode()
    }

    pub fn source_key(&self) -> &str {
        &self.required[0]
    }

    pub fn output_key(&self) -> &str {
        &self.outputs[0]
    }

    pub fn warnings_key(&self) -> &str {
        &self.outputs[1]
    }

    pub fn metadata_key(&self) -> &str {
        &self.outputs[2]
    }
}

#[async_trait]
impl Node for ValidationNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "validation"
    }

    fn required_keys(&self) -> &[String] {
        &self.required
    }

    fn output_keys(&self) -> &[String] {
        &self.outputs
    }

    async fn execute(
        &self,
        state: &PipelineState,
        metrics: &mut NodeMetrics,
    ) -> Result<StateUpdate, NodeError> {
        let record = state.get(self.source_key()).cloned().unwrap_or(Value::Null);
        let report = self.validator.validate(&record).await?;

        for warning in &report.warnings {
            metrics.warn(warning.clone());
        }
        let metadata =
            serde_json::to_value(&report.metadata).map_err(|e| NodeError::InvalidState {
                key: self.metadata_key().to_string(),
                message: e.to_string(),
            })?;

        Ok(StateUpdate::new()
            .set(self.output_key(), Value::Object(report.validated))
            .set(self.warnings_key(), Value::from(report.warnings))
            .set(self.metadata_key(), metadata))
    }
}
