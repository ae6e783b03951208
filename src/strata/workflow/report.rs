// SPDX-License-Identifier: MIT

//! Per-run workflow report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::strata::node::{NodeMetrics, NodeStatus};

/// Per-node metrics plus run-level aggregates
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
    pub nodes: Vec<NodeMetrics>,
}

impl WorkflowReport {
    pub fn node(&self, name: &str) -> Option<&NodeMetrics> {
        self.nodes.iter().find(|m| m.node == name)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|m| m.status == status).count()
    }

    pub fn total_warnings(&self) -> usize {
        self.nodes.iter().map(|m| m.warnings.len()).sum()
    }

    /// Sum of node durations (excludes time spent between nodes)
    pub fn node_time(&self) -> Duration {
        self.nodes.iter().map(|m| m.duration).sum()
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Workflow '{}' run {}: {} in {:?}",
            self.workflow,
            self.run_id,
            if self.success { "success" } else { "failed" },
            self.duration
        )?;
        for m in &self.nodes {
            write!(f, "  {:<16} {:<8} {:?}", m.node, m.status, m.duration)?;
            if !m.warnings.is_empty() {
                write!(f, "  ({} warnings)", m.warnings.len())?;
            }
            if let Some(error) = &m.error {
                write!(f, "  error: {}", error)?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "Totals: {} succeeded, {} failed, {} skipped, {} warnings",
            self.count(NodeStatus::Success),
            self.count(NodeStatus::Failed),
            self.count(NodeStatus::Skipped),
            self.total_warnings()
        )
    }
}
