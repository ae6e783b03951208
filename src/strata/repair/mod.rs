// SPDX-License-Identifier: MIT

//! Repair cascade for structured model output
//!
//! A [`RepairCascade`] is an ordered list of [`RepairStrategy`] values. Each
//! strategy returns a tagged [`StrategyOutcome`]; the cascade stops at the
//! first recovered record and otherwise collects every failure reason.

mod parse;
mod partial;
mod structural;

pub use parse::{parse_object, sample, strip_code_fences};
pub use partial::recover as recover_fields;
pub use structural::{repair as repair_structure, Repaired, StructuralFix};

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::adk::model::{Content, Model};
use crate::strata::error::NodeError;
use crate::strata::schema::RecordSchema;

/// Characters of raw text kept in extraction errors
pub const SAMPLE_CHARS: usize = 500;

const REPAIR_SYSTEM_PROMPT: &str =
    "You repair malformed JSON. Reply with a single valid JSON object and nothing else.";

/// One fallback strategy of the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    DirectParse,
    StructuralRepair,
    ModelAssisted,
    PartialFields,
}

impl RepairStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RepairStrategy::DirectParse => "direct_parse",
            RepairStrategy::StructuralRepair => "structural_repair",
            RepairStrategy::ModelAssisted => "model_assisted",
            RepairStrategy::PartialFields => "partial_fields",
        }
    }
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tagged result of a single strategy
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Recovered {
        record: Map<String, Value>,
        warning: Option<String>,
    },
    Failed(String),
}

/// Why one strategy gave up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub strategy: RepairStrategy,
    pub reason: String,
}

/// What the cascade works on
#[derive(Clone, Copy)]
pub struct CascadeInput<'a> {
    /// The model response to recover a record from
    pub raw: &'a str,
    /// Text the response was produced from, searched by partial recovery
    pub source: Option<&'a str>,
    pub schema: &'a RecordSchema,
    /// Required by model-assisted repair; that strategy fails without one
    pub model: Option<&'a dyn Model>,
}

#[derive(Debug, Clone)]
pub struct CascadeSuccess {
    pub record: Map<String, Value>,
    pub strategy: RepairStrategy,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CascadeFailure {
    /// Error from parsing the raw text as-is
    pub original_error: String,
    /// The raw text, truncated
    pub sample: String,
    pub attempts: Vec<StrategyFailure>,
}

impl From<CascadeFailure> for NodeError {
    fn from(failure: CascadeFailure) -> Self {
        NodeError::ExtractionExhausted {
            original_error: failure.original_error,
            sample: failure.sample,
            attempts: failure.attempts,
        }
    }
}

/// Ordered fallback strategies, first success wins
#[derive(Debug, Clone, PartialEq)]
pub struct RepairCascade {
    strategies: Vec<RepairStrategy>,
}

impl Default for RepairCascade {
    fn default() -> Self {
        Self::new(vec![
            RepairStrategy::DirectParse,
            RepairStrategy::StructuralRepair,
            RepairStrategy::ModelAssisted,
            RepairStrategy::PartialFields,
        ])
    }
}

impl RepairCascade {
    pub fn new(strategies: Vec<RepairStrategy>) -> Self {
        Self { strategies }
    }

    /// Cascade without the model round trip
    pub fn offline() -> Self {
        Self::new(vec![
            RepairStrategy::DirectParse,
            RepairStrategy::StructuralRepair,
            RepairStrategy::PartialFields,
        ])
    }

    pub fn strategies(&self) -> &[RepairStrategy] {
        &self.strategies
    }

    /// Try each strategy in order until one recovers a record
    pub async fn run(&self, input: CascadeInput<'_>) -> Result<CascadeSuccess, CascadeFailure> {
        let original_error = match parse_object(input.raw) {
            Ok(_) => None,
            Err(e) => Some(e),
        };
        let mut attempts = Vec::new();

        for &strategy in &self.strategies {
            match attempt(strategy, &input, original_error.as_deref()).await {
                StrategyOutcome::Recovered { record, warning } => {
                    log::debug!("Strategy {} recovered {} fields", strategy, record.len());
                    return Ok(CascadeSuccess {
                        record,
                        strategy,
                        warnings: warning.into_iter().collect(),
                    });
                }
                StrategyOutcome::Failed(reason) => {
                    log::debug!("Strategy {} failed: {}", strategy, reason);
                    attempts.push(StrategyFailure { strategy, reason });
                }
            }
        }

        Err(CascadeFailure {
            original_error: original_error
                .unwrap_or_else(|| "direct parsing was not attempted".to_string()),
            sample: sample(input.raw, SAMPLE_CHARS),
            attempts,
        })
    }
}

/// Parse with the offline strategies only: direct, then structural
///
/// Returns the record and, when structural fixes were needed, their names.
pub fn parse_with_repair(text: &str) -> Result<(Map<String, Value>, Option<String>), String> {
    match parse_object(text) {
        Ok(record) => Ok((record, None)),
        Err(direct) => match repair_structure(text) {
            Ok(repaired) => {
                let fixes = repaired.fix_names();
                Ok((repaired.record, Some(fixes)))
            }
            Err(_) => Err(direct),
        },
    }
}

async fn attempt(
    strategy: RepairStrategy,
    input: &CascadeInput<'_>,
    original_error: Option<&str>,
) -> StrategyOutcome {
    match strategy {
        RepairStrategy::DirectParse => match parse_object(input.raw) {
            Ok(record) => StrategyOutcome::Recovered {
                record,
                warning: None,
            },
            Err(e) => StrategyOutcome::Failed(e),
        },
        RepairStrategy::StructuralRepair => match repair_structure(input.raw) {
            Ok(repaired) => StrategyOutcome::Recovered {
                warning: Some(format!(
                    "JSON required incremental repair ({})",
                    repaired.fix_names()
                )),
                record: repaired.record,
            },
            Err(e) => StrategyOutcome::Failed(e),
        },
        RepairStrategy::ModelAssisted => model_assisted(input, original_error).await,
        RepairStrategy::PartialFields => {
            let mut texts = vec![input.raw];
            texts.extend(input.source);
            match recover_fields(input.schema, &texts) {
                Ok(record) => {
                    let recovered: Vec<&str> = record.keys().map(String::as_str).collect();
                    StrategyOutcome::Recovered {
                        warning: Some(format!(
                            "JSON extraction fell back to partial field recovery \
                             ({}/{} fields: {})",
                            record.len(),
                            input.schema.fields().len(),
                            recovered.join(", ")
                        )),
                        record,
                    }
                }
                Err(e) => StrategyOutcome::Failed(e),
            }
        }
    }
}

async fn model_assisted(input: &CascadeInput<'_>, original_error: Option<&str>) -> StrategyOutcome {
    let Some(model) = input.model else {
        return StrategyOutcome::Failed("no model available for repair".to_string());
    };

    let prompt = format!(
        "The following text should contain a JSON object but could not be parsed.\n\n\
         Parse error: {}\n\n\
         Expected record:\n{}\n\n\
         Text:\n{}\n\n\
         Return only the corrected JSON object.",
        original_error.unwrap_or("unknown"),
        input.schema.describe(),
        input.raw
    );
    let history = [Content::system(REPAIR_SYSTEM_PROMPT), Content::user(prompt)];

    let reply = match model.generate_content(&history, None).await {
        Ok(content) => content.text(),
        Err(e) => return StrategyOutcome::Failed(format!("repair call failed: {}", e)),
    };

    match parse_with_repair(&reply) {
        Ok((record, None)) => StrategyOutcome::Recovered {
            record,
            warning: Some("JSON required model-assisted repair".to_string()),
        },
        Ok((record, Some(fixes))) => StrategyOutcome::Recovered {
            record,
            warning: Some(format!("JSON required model-assisted repair ({})", fixes)),
        },
        Err(e) => StrategyOutcome::Failed(format!("repair reply unparseable: {}", e)),
    }
}
