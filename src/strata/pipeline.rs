// SPDX-License-Identifier: MIT

//! The canonical analyze -> extract -> validate pipeline

use std::sync::Arc;

use crate::adk::error::StrataError;
use crate::adk::model::{GenerationConfig, Model};
use crate::strata::node::{ExtractionNode, IntelligenceNode, Node, ValidationNode};
use crate::strata::repair::RepairCascade;
use crate::strata::schema::RecordSchema;
use crate::strata::state::StateSchema;
use crate::strata::validation::{SemanticRule, ValidationMode, Validator};
use crate::strata::workflow::Workflow;

pub const DEFAULT_MAX_RETRIES: usize = 2;

/// Fluent configuration for the three-stage pipeline most agents use
///
/// ```ignore
/// let workflow = AnalysisPipeline::new("triage", model, schema, "Ticket: {ticket}")
///     .with_mode(ValidationMode::BestEffort)
///     .build()?;
/// let state = workflow.invoke(json!({"ticket": "Login fails"})).await?;
/// ```
pub struct AnalysisPipeline {
    name: String,
    model: Arc<dyn Model>,
    schema: Arc<RecordSchema>,
    analysis_prompt: String,
    system_prompt: Option<String>,
    generation_config: Option<GenerationConfig>,
    mode: ValidationMode,
    max_retries: usize,
    cascade: RepairCascade,
    rules: Vec<SemanticRule>,
}

impl AnalysisPipeline {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn Model>,
        schema: Arc<RecordSchema>,
        analysis_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            schema,
            analysis_prompt: analysis_prompt.into(),
            system_prompt: None,
            generation_config: None,
            mode: ValidationMode::Strict,
            max_retries: DEFAULT_MAX_RETRIES,
            cascade: RepairCascade::default(),
            rules: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Only used in RETRY mode
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cascade(mut self, cascade: RepairCascade) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_rule(mut self, rule: SemanticRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> Result<Workflow, StrataError> {
        let mut analyze =
            IntelligenceNode::new("analyze", self.model.clone(), self.analysis_prompt)?;
        if let Some(system) = self.system_prompt {
            analyze = analyze.with_system_prompt(system);
        }
        if let Some(config) = self.generation_config.clone() {
            analyze = analyze.with_generation_config(config);
        }

        let mut extract = ExtractionNode::new("extract", self.schema.clone(), self.model.clone())
            .with_cascade(self.cascade);
        if let Some(config) = self.generation_config {
            extract = extract.with_generation_config(config);
        }

        let validator = match self.mode {
            ValidationMode::Strict => Validator::strict(self.schema),
            ValidationMode::Retry => Validator::retry(self.schema, self.model, self.max_retries),
            ValidationMode::BestEffort => Validator::best_effort(self.schema),
        };
        let validator = self
            .rules
            .into_iter()
            .fold(validator, |v, rule| v.with_rule(rule));
        let validate = ValidationNode::new("validate", validator);

        log::info!("Building pipeline {} ({} validation)", self.name, self.mode);
        let nodes: Vec<Arc<dyn Node>> =
            vec![Arc::new(analyze), Arc::new(extract), Arc::new(validate)];
        Ok(Workflow::sequential(self.name, StateSchema::analysis_pipeline(), nodes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::adk::model::Content;
    use crate::strata::schema::FieldSpec;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Content::model(self.replies.get(n).copied().unwrap_or("")))
        }
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let model = Arc::new(ScriptedModel {
            replies: vec![
                "The ticket describes a login bug, quite certain.",
                r#"{"category": "bug", "confidence": 0.9}"#,
            ],
            calls: AtomicUsize::new(0),
        });
        let schema = Arc::new(
            RecordSchema::builder("Triage")
                .field(FieldSpec::string("category").choices(["bug", "feature"]))
                .field(FieldSpec::float("confidence").ge(0.0).le(1.0))
                .build()
                .unwrap(),
        );

        let workflow = AnalysisPipeline::new("triage", model.clone(), schema, "Ticket: {ticket}")
            .with_mode(ValidationMode::Strict)
            .build()
            .unwrap();
        assert_eq!(workflow.execution_order(), &["analyze", "extract", "validate"]);

        let state = workflow.invoke(json!({"ticket": "Login fails"})).await.unwrap();
        assert_eq!(state.get_path("validated.category"), Some(&json!("bug")));
        assert_eq!(
            state.get_path("validation_metadata.outcome"),
            Some(&json!("valid"))
        );
        assert_eq!(state.get("history").unwrap().as_array().unwrap().len(), 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bad_prompt_fails_build() {
        let model = Arc::new(ScriptedModel {
            replies: vec![],
            calls: AtomicUsize::new(0),
        });
        let schema = Arc::new(
            RecordSchema::builder("S")
                .field(FieldSpec::string("a"))
                .build()
                .unwrap(),
        );
        let err = AnalysisPipeline::new("p", model, schema, "{unclosed")
            .build()
            .unwrap_err();
        assert!(matches!(err, StrataError::Node(_)));
    }
}
