// SPDX-License-Identifier: MIT

//! State management for pipelines
//!
//! This module provides:
//! - `StateSchema` - the key→type contract of a workflow's state
//! - `PipelineState` - runtime state storage with reducers and key ownership
//! - `StateUpdate` - the delta a node hands back to the workflow

mod schema;
mod store;
mod update;

pub(crate) use schema::json_type_name;
pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{PipelineState, INPUT_OWNER};
pub use update::{StateUpdate, UpdateEntry, UpdateOp};
