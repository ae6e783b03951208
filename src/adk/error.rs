// SPDX-License-Identifier: MIT

//! Typed error handling for strata-rs
//!
//! Model-boundary errors live here next to the top-level [`StrataError`];
//! node and workflow errors are in [`crate::strata::error`].

use crate::strata::error::{NodeError, SchemaError, WorkflowError};
use thiserror::Error;

/// Top-level error type for binaries and loaders
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration errors (missing env vars, invalid schema files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inconsistent record schema
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Errors raised by the model boundary
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Errors raised while running a single node outside a workflow
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Workflow construction or execution errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl StrataError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// API errors reported by the provider
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Transport-level HTTP failures
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Anything else a model implementation wants to surface
    #[error("{0}")]
    Other(String),
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for ModelError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ModelError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
