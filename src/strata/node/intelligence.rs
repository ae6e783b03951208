// SPDX-License-Identifier: MIT

//! Free-form reasoning over a prompt template

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Node, NodeMetrics};
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::strata::error::NodeError;
use crate::strata::state::{PipelineState, StateUpdate};
use crate::strata::template;

pub const DEFAULT_ANALYSIS_KEY: &str = "analysis";
pub const DEFAULT_HISTORY_KEY: &str = "history";

/// Renders a template from state, asks the model, stores the raw answer
///
/// The user message and the reply are appended to the shared history list so
/// later nodes can continue the conversation.
pub struct IntelligenceNode {
    name: String,
    model: Arc<dyn Model>,
    template: String,
    system_prompt: Option<String>,
    generation_config: Option<GenerationConfig>,
    required: Vec<String>,
    outputs: Vec<String>,
}

impl IntelligenceNode {
    /// Every placeholder's top-level key becomes a required key
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn Model>,
        template: impl Into<String>,
    ) -> Result<Self, NodeError> {
        let name = name.into();
        let template = template.into();
        let placeholders =
            template::placeholders(&template).map_err(|e| NodeError::template(&name, e))?;

        let mut required: Vec<String> = Vec::new();
        for key in placeholders {
            let root = key.split('.').next().unwrap_or(&key).to_string();
            if !required.contains(&root) {
                required.push(root);
            }
        }

        Ok(Self {
            name,
            model,
            template,
            system_prompt: None,
            generation_config: None,
            required,
            outputs: vec![
                DEFAULT_ANALYSIS_KEY.to_string(),
                DEFAULT_HISTORY_KEY.to_string(),
            ],
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Require keys beyond the template's placeholders
    pub fn with_required_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            let key = key.into();
            if !self.required.contains(&key) {
                self.required.push(key);
            }
        }
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.outputs[0] = key.into();
        self
    }

    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.outputs[1] = key.into();
        self
    }

    pub fn output_key(&self) -> &str {
        &self.outputs[0]
    }

    pub fn history_key(&self) -> &str {
        &self.outputs[1]
    }

    fn prior_history(&self, state: &PipelineState) -> Result<Vec<Content>, NodeError> {
        match state.get(self.history_key()) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| NodeError::InvalidState {
                    key: self.history_key().to_string(),
                    message: format!("not a list of messages: {}", e),
                })
            }
        }
    }
}

#[async_trait]
impl Node for IntelligenceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "intelligence"
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
        let prompt = template::render(&self.template, |key| state.get_path(key))
            .map_err(|e| NodeError::template(&self.name, e))?;

        let mut conversation = Vec::new();
        if let Some(system) = &self.system_prompt {
            conversation.push(Content::system(system.clone()));
        }
        conversation.extend(self.prior_history(state)?);
        let user = Content::user(prompt);
        conversation.push(user.clone());

        log::debug!("[{}] sending {} messages", self.name, conversation.len());
        let reply = self
            .model
            .generate_content(&conversation, self.generation_config.as_ref())
            .await
            .map_err(|e| NodeError::model(&self.name, e))?;

        let text = reply.text();
        if text.trim().is_empty() {
            metrics.warn("model returned an empty response");
        }

        let turn = serde_json::to_value([user, Content::model(text.clone())])
            .map_err(|e| NodeError::InvalidState {
                key: self.history_key().to_string(),
                message: e.to_string(),
            })?;

        Ok(StateUpdate::new()
            .set(self.output_key(), Value::String(text))
            .append(self.history_key(), turn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use crate::strata::node::{run_node, NodeStatus};
    use crate::strata::template::TemplateError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EchoModel {
        calls: AtomicUsize,
        seen: Mutex<Vec<usize>>,
        reply: String,
    }

    impl EchoModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait]
    impl Model for EchoModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(history.len());
            Ok(Content::model(self.reply.clone()))
        }
    }

    #[test]
    fn test_required_keys_from_template() {
        let model = EchoModel::new("x");
        let node = IntelligenceNode::new("analyze", model, "Ticket {ticket} from {user.name}")
            .unwrap()
            .with_required_keys(["ticket", "priority_hint"]);
        assert_eq!(
            node.required_keys(),
            &["ticket".to_string(), "user".to_string(), "priority_hint".to_string()]
        );
        assert_eq!(node.output_keys(), &["analysis".to_string(), "history".to_string()]);
    }

    #[test]
    fn test_bad_template_rejected() {
        let model = EchoModel::new("x");
        let err = IntelligenceNode::new("analyze", model, "Ticket {ticket").err().unwrap();
        assert!(matches!(
            err,
            NodeError::Template {
                source: TemplateError::Unclosed(7),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_writes_analysis_and_history() {
        let model = EchoModel::new("It is a login bug.");
        let node = IntelligenceNode::new("analyze", model.clone(), "Classify: {ticket}")
            .unwrap()
            .with_system_prompt("You triage tickets.");
        let state = PipelineState::empty().with_value("ticket", json!("Login fails"));

        let (state, metrics) = run_node(&node, state).await.unwrap();
        assert_eq!(state.get_str("analysis"), Some("It is a login bug."));

        let history = state.get("history").unwrap().as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[1]["role"], "model");
        assert_eq!(metrics.status, NodeStatus::Success);
        assert_eq!(*model.seen.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_model_call() {
        let model = EchoModel::new("x");
        let node = IntelligenceNode::new("analyze", model.clone(), "Classify: {ticket}").unwrap();

        let err = run_node(&node, PipelineState::empty()).await.unwrap_err();
        assert!(matches!(err, NodeError::Precondition { .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_response_is_a_warning() {
        let model = EchoModel::new("   ");
        let node = IntelligenceNode::new("analyze", model, "Classify: {ticket}").unwrap();
        let state = PipelineState::empty().with_value("ticket", json!("t"));

        let (_, metrics) = run_node(&node, state).await.unwrap();
        assert_eq!(metrics.warnings, vec!["model returned an empty response".to_string()]);
    }
}
