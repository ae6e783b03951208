// SPDX-License-Identifier: MIT

//! Workflow orchestration
//!
//! A [`Workflow`] indexes its nodes, checks the edge list, derives a
//! topological execution order and runs each node with a precondition check,
//! fresh metrics and error capture.

mod edge;
mod executor;
mod report;

pub use edge::{Edge, END, START};
pub use executor::Workflow;
pub use report::WorkflowReport;
