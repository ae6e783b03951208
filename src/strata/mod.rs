// SPDX-License-Identifier: MIT

//! Stage-pipeline engine
//!
//! - [`node`] - the Node trait and the intelligence, extraction and
//!   validation stages
//! - [`workflow`] - composes nodes into an executable graph
//! - [`repair`] - fallback strategies for malformed JSON
//! - [`validation`] - STRICT / RETRY / BEST_EFFORT validation
//! - [`schema`] - record schemas
//! - [`state`] - pipeline state, its key contract and updates

pub mod error;
pub mod node;
pub mod pipeline;
pub mod repair;
pub mod schema;
pub mod state;
pub mod template;
pub mod validation;
pub mod workflow;

pub use pipeline::AnalysisPipeline;
pub use workflow::{Edge, Workflow, WorkflowReport, END, START};
