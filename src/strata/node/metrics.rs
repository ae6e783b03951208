// SPDX-License-Identifier: MIT

//! Per-call node metrics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.pad(s)
    }
}

/// Metrics for one node within one run
///
/// A fresh record is created for every call, so concurrent runs of the same
/// workflow never share one.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetrics {
    pub node: String,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub input_keys: Vec<String>,
    pub output_keys: Vec<String>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl NodeMetrics {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: NodeStatus::Pending,
            started_at: None,
            duration: Duration::ZERO,
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            error: None,
            warnings: Vec::new(),
            clock: None,
        }
    }

    pub fn start(&mut self, input_keys: Vec<String>) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
        self.input_keys = input_keys;
        self.clock = Some(Instant::now());
    }

    pub fn succeed(&mut self, output_keys: Vec<String>) {
        self.stop();
        self.status = NodeStatus::Success;
        self.output_keys = output_keys;
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.stop();
        self.status = NodeStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn skip(&mut self) {
        self.status = NodeStatus::Skipped;
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log::warn!("[{}] {}", self.node, warning);
        self.warnings.push(warning);
    }

    fn stop(&mut self) {
        if let Some(clock) = self.clock.take() {
            self.duration = clock.elapsed();
        }
    }
}
