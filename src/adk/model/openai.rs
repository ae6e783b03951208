// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation
//!
//! Works against any OpenAI-compatible endpoint (vLLM, Ollama, LiteLLM) by
//! pointing `OPENAI_BASE_URL` at it.

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

const PROVIDER: &str = "OpenAI";

/// Model used when neither the caller nor `STRATA_MODEL` names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat completions model implementation
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ModelError::ApiKeyMissing(PROVIDER.into()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self::with_endpoint(model_name, api_key, base_url))
    }

    /// Create a model from `STRATA_MODEL` (falling back to [`DEFAULT_MODEL`])
    pub fn from_env() -> Result<Self, ModelError> {
        let model_name = env::var("STRATA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(model_name)
    }

    /// Create a model with explicit credentials, bypassing the environment
    pub fn with_endpoint(model_name: String, api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> serde_json::Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };

        json!({
            "role": role,
            "content": content.text()
        })
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &serde_json::Value) -> Result<Content, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No choices in OpenAI response".into()))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        // Reasoning models on some compatible servers report thinking separately
        if let Some(reasoning) = message["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                parts.push(Part::Thinking(reasoning.to_string()));
            }
        }

        if let Some(content) = message["content"].as_str() {
            parts.push(Part::Text(content.to_string()));
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let messages: Vec<serde_json::Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api(PROVIDER, text));
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_to_openai_user_message() {
        let msg = OpenAIModel::content_to_openai_message(&Content::user("Hello"));
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello");
    }

    #[test]
    fn test_content_to_openai_assistant_message() {
        let msg = OpenAIModel::content_to_openai_message(&Content::model("Hi there"));
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["content"], "Hi there");
    }

    #[test]
    fn test_parse_openai_text_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"category\": \"bug\"}"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.role, "model");
        assert_eq!(content.text(), "{\"category\": \"bug\"}");
    }

    #[test]
    fn test_parse_openai_reasoning_is_not_text() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "reasoning_content": "thinking...",
                    "content": "answer"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.parts.len(), 2);
        assert_eq!(content.text(), "answer");
    }

    #[test]
    fn test_parse_openai_missing_choices() {
        let err = OpenAIModel::parse_openai_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let model = OpenAIModel::with_endpoint(
            "m".to_string(),
            "k".to_string(),
            "http://localhost:8000/v1/".to_string(),
        );
        assert_eq!(model.base_url, "http://localhost:8000/v1");
        assert_eq!(model.model_name(), "m");
    }
}
