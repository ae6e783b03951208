// SPDX-License-Identifier: MIT

//! The validator state machine

use serde_json::{Map, Value};
use std::sync::Arc;

use super::feedback::{build_parse_error_feedback, build_validation_feedback};
use super::mechanical;
use super::rules::SemanticRule;
use super::{RepairRecord, ValidationMetadata, ValidationMode, ValidationOutcome, ValidationReport};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::strata::error::{AttemptRecord, NodeError};
use crate::strata::repair::parse_with_repair;
use crate::strata::schema::{format_violations, RecordSchema, Violation};

const RETRY_SYSTEM_PROMPT: &str = "You produce JSON records that must match a schema exactly. \
When told about errors, reply with the corrected JSON object only.";

/// Validates records against one schema in one mode
#[derive(Clone)]
pub struct Validator {
    name: String,
    schema: Arc<RecordSchema>,
    mode: ValidationMode,
    model: Option<Arc<dyn Model>>,
    max_retries: usize,
    generation_config: Option<GenerationConfig>,
    rules: Vec<SemanticRule>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("schema", &self.schema.name())
            .field("mode", &self.mode)
            .field("max_retries", &self.max_retries)
            .field("rules", &self.rules)
            .finish()
    }
}

impl Validator {
    fn with_mode(schema: Arc<RecordSchema>, mode: ValidationMode) -> Self {
        Self {
            name: "validator".to_string(),
            schema,
            mode,
            model: None,
            max_retries: 0,
            generation_config: None,
            rules: Vec::new(),
        }
    }

    pub fn strict(schema: Arc<RecordSchema>) -> Self {
        Self::with_mode(schema, ValidationMode::Strict)
    }

    pub fn retry(schema: Arc<RecordSchema>, model: Arc<dyn Model>, max_retries: usize) -> Self {
        let mut validator = Self::with_mode(schema, ValidationMode::Retry);
        validator.model = Some(model);
        validator.max_retries = max_retries;
        validator
    }

    pub fn best_effort(schema: Arc<RecordSchema>) -> Self {
        Self::with_mode(schema, ValidationMode::BestEffort)
    }

    /// Name used in error reports
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_rule(mut self, rule: SemanticRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Validate a record according to the configured mode
    pub async fn validate(&self, record: &Value) -> Result<ValidationReport, NodeError> {
        let original_keys = record
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        let first = self.schema.validate(record);
        let (validated, outcome, repairs, retries, mut warnings) = match (first, self.mode) {
            (Ok(validated), _) => (
                validated,
                ValidationOutcome::Valid,
                RepairRecord::new(),
                0,
                Vec::new(),
            ),
            (Err(violations), ValidationMode::Strict) => {
                log::warn!(
                    "[{}] strict validation failed: {}",
                    self.name,
                    format_violations(&violations)
                );
                return Err(NodeError::SchemaViolation { violations });
            }
            (Err(violations), ValidationMode::Retry) => {
                let (validated, retries) = self.retry_loop(record, violations).await?;
                let warnings = vec![format!("record repaired after {} retries", retries)];
                (
                    validated,
                    ValidationOutcome::RepairedAfterRetries(retries),
                    RepairRecord::new(),
                    retries,
                    warnings,
                )
            }
            (Err(_), ValidationMode::BestEffort) => {
                let (validated, outcome, repairs, warnings) = self.best_effort_passes(record)?;
                (validated, outcome, repairs, 0, warnings)
            }
        };

        warnings.extend(self.rules.iter().filter_map(|rule| rule.evaluate(&validated)));

        let metadata = ValidationMetadata {
            mode: self.mode,
            outcome,
            repairs,
            retries,
            original_keys,
            validated_keys: validated.keys().cloned().collect(),
        };
        log::info!(
            "[{}] {} validation outcome: {}",
            self.name,
            self.mode,
            metadata.outcome
        );

        Ok(ValidationReport {
            validated,
            warnings,
            metadata,
        })
    }

    /// Re-prompt the model in one growing conversation until the record
    /// validates or the retry budget is spent
    async fn retry_loop(
        &self,
        record: &Value,
        violations: Vec<Violation>,
    ) -> Result<(Map<String, Value>, usize), NodeError> {
        let model = self.model.as_ref().ok_or_else(|| NodeError::InvalidState {
            key: "model".to_string(),
            message: "RETRY validation requires a model".to_string(),
        })?;
        let schema_json = self.schema.to_json_schema();

        let mut errors: Vec<String> = violations.iter().map(ToString::to_string).collect();
        let mut history = vec![AttemptRecord {
            attempt: 0,
            submitted: record.clone(),
            errors: errors.clone(),
            raw_output: None,
        }];
        let mut conversation = vec![Content::system(RETRY_SYSTEM_PROMPT)];
        let mut submission = record.clone();
        let mut unparsed: Option<(String, String)> = None;

        for attempt in 1..=self.max_retries {
            let feedback = match &unparsed {
                Some((raw, parse_error)) => build_parse_error_feedback(
                    raw,
                    parse_error,
                    attempt,
                    self.max_retries,
                    &schema_json,
                ),
                None => build_validation_feedback(
                    &schema_json,
                    &submission,
                    &errors,
                    attempt,
                    self.max_retries,
                ),
            };
            conversation.push(Content::user(feedback));

            log::info!("[{}] validation retry {}/{}", self.name, attempt, self.max_retries);
            let reply = model
                .generate_content(&conversation, self.generation_config.as_ref())
                .await
                .map_err(|e| NodeError::model(&self.name, e))?;
            let text = reply.text();
            conversation.push(Content::model(text.clone()));

            match parse_with_repair(&text) {
                Ok((parsed, _)) => {
                    let candidate = Value::Object(parsed);
                    match self.schema.validate(&candidate) {
                        Ok(validated) => return Ok((validated, attempt)),
                        Err(violations) => {
                            errors = violations.iter().map(ToString::to_string).collect();
                            history.push(AttemptRecord {
                                attempt,
                                submitted: candidate.clone(),
                                errors: errors.clone(),
                                raw_output: Some(text),
                            });
                            submission = candidate;
                            unparsed = None;
                        }
                    }
                }
                Err(parse_error) => {
                    history.push(AttemptRecord {
                        attempt,
                        submitted: Value::Null,
                        errors: vec![format!("reply is not valid JSON: {}", parse_error)],
                        raw_output: Some(text.clone()),
                    });
                    unparsed = Some((text, parse_error));
                }
            }
        }

        Err(NodeError::RetryExhausted {
            retries: self.max_retries,
            history,
        })
    }

    /// Exactly two repair-then-revalidate passes
    #[allow(clippy::type_complexity)]
    fn best_effort_passes(
        &self,
        record: &Value,
    ) -> Result<(Map<String, Value>, ValidationOutcome, RepairRecord, Vec<String>), NodeError> {
        let mut warnings = Vec::new();
        let original = match record {
            Value::Object(map) => map.clone(),
            _ => {
                warnings.push(
                    "record was not a JSON object; repaired from an empty record".to_string(),
                );
                Map::new()
            }
        };

        let mut repairs = RepairRecord::new();
        let first = mechanical::first_pass(&self.schema, &original, &mut repairs);
        let (validated, outcome) = match self.schema.validate(&Value::Object(first.clone())) {
            Ok(validated) => (validated, ValidationOutcome::BestEffortRepaired),
            Err(_) => {
                let second = mechanical::second_pass(&self.schema, first, &mut repairs);
                match self.schema.validate(&Value::Object(second)) {
                    Ok(validated) => (validated, ValidationOutcome::BestEffortWithTypeDefaults),
                    Err(violations) => {
                        return Err(NodeError::RepairExhausted {
                            violations,
                            repairs,
                        })
                    }
                }
            }
        };

        warnings.extend(
            repairs
                .iter()
                .map(|(field, action)| format!("field '{}' repaired: {}", field, action)),
        );
        Ok((validated, outcome, repairs, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::strata::schema::FieldSpec;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        replies: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // system + (user, model) per earlier round + this user message
            assert_eq!(history.len(), 2 + 2 * n);
            let reply = self
                .replies
                .get(n)
                .or(self.replies.last())
                .cloned()
                .unwrap_or_default();
            Ok(Content::model(reply))
        }
    }

    fn schema() -> Arc<RecordSchema> {
        Arc::new(
            RecordSchema::builder("Triage")
                .field(FieldSpec::string("category").choices(["bug", "feature", "question"]))
                .field(FieldSpec::float("confidence").ge(0.0).le(1.0))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_valid_record_needs_nothing() {
        let model = ScriptedModel::new(&[]);
        let validator = Validator::retry(schema(), model.clone(), 2);
        let report = validator
            .validate(&json!({"category": "bug", "confidence": 0.5}))
            .await
            .unwrap();
        assert_eq!(report.metadata.outcome, ValidationOutcome::Valid);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_strict_raises_immediately() {
        let err = Validator::strict(schema())
            .validate(&json!({"confidence": 0.5}))
            .await
            .unwrap_err();
        match err {
            NodeError::SchemaViolation { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "category");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_repairs_on_first_attempt() {
        let model = ScriptedModel::new(&[r#"{"category": "bug", "confidence": 0.5}"#]);
        let report = Validator::retry(schema(), model.clone(), 2)
            .validate(&json!({"confidence": 0.5}))
            .await
            .unwrap();
        assert_eq!(report.metadata.outcome.tag(), "repaired_after_1_retries");
        assert_eq!(report.metadata.retries, 1);
        assert_eq!(report.validated["category"], "bug");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_keeps_history() {
        let model = ScriptedModel::new(&["not json", r#"{"category": "outage"}"#]);
        let err = Validator::retry(schema(), model.clone(), 2)
            .validate(&json!({}))
            .await
            .unwrap_err();
        assert_eq!(model.calls(), 2);
        match err {
            NodeError::RetryExhausted { retries, history } => {
                assert_eq!(retries, 2);
                assert_eq!(history.len(), 3);
                assert_eq!(history[1].submitted, Value::Null);
                assert!(history[1].errors[0].starts_with("reply is not valid JSON"));
                assert!(history[2].errors.iter().any(|e| e.contains("outage")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_best_effort_clamps_and_round_trips() {
        let validator = Validator::best_effort(schema());
        let report = validator
            .validate(&json!({"category": "Bug", "confidence": 1.5}))
            .await
            .unwrap();
        assert_eq!(report.validated["confidence"], json!(1.0));
        assert_eq!(report.metadata.repairs.get("confidence"), Some("clamped_to_max_1"));
        assert_eq!(report.metadata.outcome, ValidationOutcome::BestEffortRepaired);

        let again = validator
            .validate(&Value::Object(report.validated.clone()))
            .await
            .unwrap();
        assert_eq!(again.metadata.outcome, ValidationOutcome::Valid);
        assert!(again.metadata.repairs.is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_second_pass() {
        let report = Validator::best_effort(schema())
            .validate(&json!("not an object"))
            .await
            .unwrap();
        assert_eq!(
            report.metadata.outcome,
            ValidationOutcome::BestEffortWithTypeDefaults
        );
        assert_eq!(report.validated["category"], "bug");
        assert_eq!(report.metadata.repairs.get("category"), Some("used_type_default"));
    }

    #[tokio::test]
    async fn test_best_effort_exhaustion() {
        let err = Validator::best_effort(schema())
            .validate(&json!({"category": "outage", "confidence": 0.3}))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::RepairExhausted { .. }));
    }

    #[tokio::test]
    async fn test_semantic_rules_become_warnings() {
        let validator = Validator::best_effort(schema()).with_rule(SemanticRule::predicate(
            "confident_questions",
            "questions should be confident",
            |r| r["category"] != "question" || r["confidence"].as_f64().unwrap_or(0.0) > 0.5,
        ));
        let report = validator
            .validate(&json!({"category": "question", "confidence": 0.1}))
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("confident_questions"));

    }

    #[tokio::test]
    async fn test_strict_runs_rules_on_valid_record() {
        let strict = Validator::strict(schema()).with_rule(SemanticRule::predicate(
            "never",
            "always fails",
            |_| false,
        ));
        let report = strict
            .validate(&json!({"category": "bug", "confidence": 0.1}))
            .await
            .unwrap();
        assert_eq!(report.warnings, vec!["semantic rule 'never' failed: always fails"]);
        assert_eq!(report.metadata.outcome, ValidationOutcome::Valid);
    }
}
