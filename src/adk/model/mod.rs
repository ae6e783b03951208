// SPDX-License-Identifier: MIT

//! Model module - the generative model boundary
//!
//! Nodes only ever see the [`Model`] trait: an ordered list of messages goes
//! in, one message comes back. Concrete clients live in submodules:
//! - [openai] - OpenAI-compatible chat completions API

pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models, never treated as an answer
    Thinking(String),
}

impl Content {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new("model", text)
    }

    /// Concatenated text parts; thinking parts are skipped
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("let me think".to_string()),
                Part::Text("{\"a\": ".to_string()),
                Part::Text("1}".to_string()),
            ],
        };
        assert_eq!(content.text(), "{\"a\": 1}");
    }

    #[test]
    fn test_content_roundtrips_through_json() {
        let content = Content::user("hello");
        let value = serde_json::to_value(&content).unwrap();
        let back: Content = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
        assert_eq!(back.role, "user");
    }
}
