// SPDX-License-Identifier: MIT

//! strata-rs: a stage-pipeline engine for LLM-backed agents
//!
//! - [`adk`] - the model boundary and top-level errors
//! - [`strata`] - nodes, state, schemas, the repair cascade, validation modes
//!   and the workflow orchestrator

pub mod adk;
pub mod strata;
