// SPDX-License-Identifier: MIT

//! Structured extraction with a repair cascade

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Node, NodeMetrics};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::strata::error::NodeError;
use crate::strata::repair::{CascadeInput, RepairCascade};
use crate::strata::schema::RecordSchema;
use crate::strata::state::{PipelineState, StateUpdate};
use crate::strata::template::{self, TemplateError};

pub const DEFAULT_EXTRACTED_KEY: &str = "extracted";
pub const EXTRACTION_WARNINGS_KEY: &str = "extraction_warnings";

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract structured data. Reply with one JSON object and no commentary.";

const DEFAULT_PROMPT: &str = "Extract a record from the text below.\n\n\
{schema}\n\n\
Reply with a single JSON object containing exactly these fields.\n\n\
Text:\n{text}";

/// Asks the model for a JSON record and recovers it through the cascade
pub struct ExtractionNode {
    name: String,
    schema: Arc<RecordSchema>,
    model: Arc<dyn Model>,
    prompt_template: String,
    cascade: RepairCascade,
    generation_config: Option<GenerationConfig>,
    required: Vec<String>,
    outputs: Vec<String>,
}

impl ExtractionNode {
    pub fn new(name: impl Into<String>, schema: Arc<RecordSchema>, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            schema,
            model,
            prompt_template: DEFAULT_PROMPT.to_string(),
            cascade: RepairCascade::default(),
            generation_config: None,
            required: vec!["analysis".to_string()],
            outputs: vec![
                DEFAULT_EXTRACTED_KEY.to_string(),
                EXTRACTION_WARNINGS_KEY.to_string(),
            ],
        }
    }

    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.required = vec![key.into()];
        self
    }

    /// Also moves the warnings to `<key>_warnings`, so several extractors
    /// can share one workflow
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.outputs[1] = format!("{}_warnings", key);
        self.outputs[0] = key;
        self
    }

    pub fn with_warnings_key(mut self, key: impl Into<String>) -> Self {
        self.outputs[1] = key.into();
        self
    }

    /// Custom prompt; only `{schema}` and `{text}` placeholders are allowed
    pub fn with_prompt_template(mut self, prompt: impl Into<String>) -> Result<Self, NodeError> {
        let prompt = prompt.into();
        let keys =
            template::placeholders(&prompt).map_err(|e| NodeError::template(&self.name, e))?;
        if let Some(bad) = keys.into_iter().find(|k| k != "schema" && k != "text") {
            return Err(NodeError::template(
                &self.name,
                TemplateError::UnknownPlaceholder(bad),
            ));
        }
        self.prompt_template = prompt;
        Ok(self)
    }

    pub fn with_cascade(mut self, cascade: RepairCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
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

    fn source_text(&self, state: &PipelineState) -> Result<String, NodeError> {
        match state.get(self.source_key()) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(NodeError::InvalidState {
                key: self.source_key().to_string(),
                message: "no text to extract from".to_string(),
            }),
            Some(other) => Ok(other.to_string()),
        }
    }

    fn render_prompt(&self, text: &str) -> Result<String, NodeError> {
        let schema = Value::String(self.schema.describe());
        let text = Value::String(text.to_string());
        template::render(&self.prompt_template, |key| match key {
            "schema" => Some(&schema),
            "text" => Some(&text),
            _ => None,
        })
        .map_err(|e| NodeError::template(&self.name, e))
    }
}

#[async_trait]
impl Node for ExtractionNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "extraction"
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
        let text = self.source_text(state)?;
        let prompt = self.render_prompt(&text)?;
        let conversation = [
            Content::system(EXTRACTION_SYSTEM_PROMPT),
            Content::user(prompt),
        ];

        let reply = self
            .model
            .generate_content(&conversation, self.generation_config.as_ref())
            .await
            .map_err(|e| NodeError::model(&self.name, e))?;
        let raw = reply.text();

        let recovered = self
            .cascade
            .run(CascadeInput {
                raw: &raw,
                source: Some(&text),
                schema: &self.schema,
                model: Some(self.model.as_ref()),
            })
            .await?;

        log::info!(
            "[{}] extracted {} fields via {}",
            self.name,
            recovered.record.len(),
            recovered.strategy
        );
        for warning in &recovered.warnings {
            metrics.warn(warning.clone());
        }

        Ok(StateUpdate::new()
            .set(self.output_key(), Value::Object(recovered.record))
            .set(self.warnings_key(), Value::from(recovered.warnings)))
    }
}
