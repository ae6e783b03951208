// SPDX-License-Identifier: MIT

//! Agent development kit: the model boundary and shared error types

pub mod error;
pub mod model;
