// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use strata_rs::adk::error::{ModelError, StrataError};
use strata_rs::adk::model::openai::{OpenAIModel, DEFAULT_MODEL};
use strata_rs::adk::model::Model;
use strata_rs::strata::schema::RecordSchema;
use strata_rs::strata::validation::ValidationMode;
use strata_rs::strata::AnalysisPipeline;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PROMPT: &str = "Analyze the following text carefully.\n\n{input}";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run analyze -> extract -> validate over an input text
    Run {
        /// Path to the record schema (YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Input text, or a path to a file holding it
        #[arg(short, long)]
        input: String,

        /// Analysis prompt; `{input}` is replaced by the input text
        #[arg(short, long)]
        prompt: Option<String>,

        /// Validation mode: strict, retry or best_effort
        #[arg(long, default_value = "strict")]
        mode: ValidationMode,

        /// Retry budget for retry mode
        #[arg(long, default_value_t = 2)]
        max_retries: usize,

        /// The model to use (defaults to STRATA_MODEL)
        #[arg(short, long)]
        model: Option<String>,

        /// Abandon the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the pipeline graph for a schema
    Visualize {
        /// Path to the record schema (YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Validation mode: strict, retry or best_effort
        #[arg(long, default_value = "strict")]
        mode: ValidationMode,
    },
}

fn read_input(input: &str) -> anyhow::Result<String> {
    let path = Path::new(input);
    let text = if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?
    } else {
        input.to_string()
    };
    if text.trim().is_empty() {
        return Err(StrataError::config("input text is empty").into());
    }
    Ok(text)
}

/// Missing credentials are a configuration problem, not a model failure
fn model_setup_error(err: ModelError) -> StrataError {
    match err {
        ModelError::ApiKeyMissing(provider) => StrataError::config(format!(
            "no API key for {}: set OPENAI_API_KEY in the environment or a .env file",
            provider
        )),
        other => other.into(),
    }
}

fn build_model(name: Option<String>) -> Result<Arc<dyn Model>, StrataError> {
    let model = match name {
        Some(name) => OpenAIModel::new(name),
        None => OpenAIModel::from_env(),
    }
    .map_err(model_setup_error)?;
    Ok(Arc::new(model))
}

fn load_schema(path: &Path) -> anyhow::Result<Arc<RecordSchema>> {
    let schema = RecordSchema::from_yaml_file(path)
        .with_context(|| format!("failed to load schema {}", path.display()))?;
    Ok(Arc::new(schema))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            schema,
            input,
            prompt,
            mode,
            max_retries,
            model,
            timeout,
        } => {
            let schema = load_schema(&schema)?;
            let text = read_input(&input)?;

            let model = build_model(model)?;

            let workflow = AnalysisPipeline::new(
                schema.name().to_string(),
                model,
                schema,
                prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            )
            .with_mode(mode)
            .with_max_retries(max_retries)
            .build()?;

            let initial = json!({ "input": text });
            let state = match timeout {
                Some(secs) => {
                    workflow
                        .invoke_with_timeout(initial, Duration::from_secs(secs))
                        .await?
                }
                None => workflow.invoke(initial).await?,
            };

            for key in ["extraction_warnings", "validation_warnings"] {
                if let Some(warnings) = state.get(key).and_then(|v| v.as_array()) {
                    for warning in warnings {
                        log::warn!("{}", warning.as_str().unwrap_or_default());
                    }
                }
            }

            let validated = state.get("validated").cloned().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&validated)?);

            if let Some(report) = workflow.get_metrics() {
                eprintln!("{}", report);
            }
        }
        Commands::Visualize { schema, mode } => {
            let schema = load_schema(&schema)?;
            // Never called; building the graph needs no credentials.
            let model = Arc::new(OpenAIModel::with_endpoint(
                DEFAULT_MODEL.to_string(),
                String::new(),
                String::new(),
            ));
            let workflow =
                AnalysisPipeline::new(schema.name().to_string(), model, schema, DEFAULT_PROMPT)
                    .with_mode(mode)
                    .build()?;
            println!("{}", workflow.visualize());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let err = model_setup_error(ModelError::ApiKeyMissing("OpenAI".to_string()));
        assert!(matches!(err, StrataError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = model_setup_error(ModelError::InvalidResponse("empty".to_string()));
        assert!(matches!(err, StrataError::Model(_)));
    }

    #[test]
    fn test_blank_input_rejected() {
        let err = read_input("   ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StrataError>(),
            Some(StrataError::Config(_))
        ));
        assert_eq!(read_input("Login fails").unwrap(), "Login fails");
    }
}
