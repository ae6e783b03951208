// SPDX-License-Identifier: MIT

//! Edges between workflow nodes

use std::fmt;
use std::sync::Arc;

use crate::strata::state::PipelineState;

/// Entry sentinel: an edge from `START` marks a node as an entry point
pub const START: &str = "__start__";
/// Exit sentinel: an edge to `END` marks a node as terminal
pub const END: &str = "__end__";

type Condition = dyn Fn(&PipelineState) -> bool + Send + Sync;

/// A directed edge, optionally guarded by a predicate over the state
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    condition: Option<(String, Arc<Condition>)>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Guard the edge with a named predicate, evaluated when `to` is reached
    pub fn when<F>(mut self, label: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&PipelineState) -> bool + Send + Sync + 'static,
    {
        self.condition = Some((label.into(), Arc::new(condition)));
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub fn label(&self) -> Option<&str> {
        self.condition.as_ref().map(|(label, _)| label.as_str())
    }

    /// Whether the guard (if any) holds for `state`
    pub fn allows(&self, state: &PipelineState) -> bool {
        match &self.condition {
            Some((_, condition)) => condition(state),
            None => true,
        }
    }

    pub(crate) fn touches_sentinel(&self) -> bool {
        self.from == START || self.to == END
    }
}

pub(crate) fn display_name(name: &str) -> &str {
    match name {
        START => "START",
        END => "END",
        other => other,
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("condition", &self.label())
            .finish()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", display_name(&self.from), display_name(&self.to))?;
        if let Some(label) = self.label() {
            write!(f, " [when: {}]", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conditional_edge() {
        let edge = Edge::new("extract", "validate").when("has_record", |s| s.contains("extracted"));
        assert!(edge.is_conditional());
        assert!(!edge.allows(&PipelineState::empty()));
        assert!(edge.allows(&PipelineState::empty().with_value("extracted", json!({}))));
        assert_eq!(edge.to_string(), "extract -> validate [when: has_record]");
    }

    #[test]
    fn test_sentinels_display() {
        assert_eq!(Edge::new(START, "a").to_string(), "START -> a");
        assert_eq!(Edge::new("a", END).to_string(), "a -> END");
        assert!(Edge::new("a", END).touches_sentinel());
    }
}
