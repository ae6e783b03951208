// SPDX-License-Identifier: MIT

//! State deltas returned by nodes

use serde_json::Value;

/// How a single entry is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// Write through the key's reducer; only the key's owner may rewrite it
    Set,
    /// Append to a list key; any node may append
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEntry {
    pub key: String,
    pub value: Value,
    pub op: UpdateOp,
}

/// The keys a node adds to the state. Nodes never hold a mutable state
/// reference; the workflow applies the update on their behalf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    entries: Vec<UpdateEntry>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.push(UpdateEntry {
            key: key.into(),
            value,
            op: UpdateOp::Set,
        });
        self
    }

    /// Append one item, or every item of an array value
    pub fn append(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.push(UpdateEntry {
            key: key.into(),
            value,
            op: UpdateOp::Append,
        });
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !keys.contains(&entry.key.as_str()) {
                keys.push(&entry.key);
            }
        }
        keys
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| &e.value)
    }

    pub fn entries(&self) -> &[UpdateEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<UpdateEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
