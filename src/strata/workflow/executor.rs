// SPDX-License-Identifier: MIT

//! Workflow executor

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::edge::{display_name, Edge, END, START};
use super::report::WorkflowReport;
use crate::strata::error::{NodeFailure, WorkflowError};
use crate::strata::node::{execute_node, Node, NodeMetrics, NodeStatus};
use crate::strata::state::{PipelineState, StateSchema};

/// Nodes composed into a directed acyclic graph
///
/// Nodes run one at a time in topological order (ties broken by declaration
/// order). A node with incoming edges runs only if at least one of them
/// fires: its source is `START` or a node that succeeded in this run, and
/// its condition holds. Otherwise the node is skipped.
pub struct Workflow {
    name: String,
    schema: StateSchema,
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    edges: Vec<Edge>,
    last_report: Mutex<Option<WorkflowReport>>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("edges", &self.edges)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Build and check a workflow; nothing is executed
    pub fn new(
        name: impl Into<String>,
        schema: StateSchema,
        nodes: Vec<Arc<dyn Node>>,
        edges: Vec<Edge>,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        if nodes.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut declared: Vec<String> = Vec::with_capacity(nodes.len());
        let mut index: HashMap<String, Arc<dyn Node>> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let node_name = node.name().to_string();
            if index.contains_key(&node_name) {
                return Err(WorkflowError::DuplicateNode(node_name));
            }
            declared.push(node_name.clone());
            index.insert(node_name, node);
        }

        for edge in &edges {
            let from_ok = edge.from == START || index.contains_key(&edge.from);
            let to_ok = edge.to == END || index.contains_key(&edge.to);
            if !from_ok || !to_ok {
                let missing = if from_ok { &edge.to } else { &edge.from };
                return Err(WorkflowError::UnknownNode {
                    from: display_name(&edge.from).to_string(),
                    to: display_name(&edge.to).to_string(),
                    missing: display_name(missing).to_string(),
                });
            }
        }

        let order = topological_order(&declared, &edges)?;
        log::debug!("Workflow {} execution order: {:?}", name, order);

        Ok(Self {
            name,
            schema,
            nodes: index,
            order,
            edges,
            last_report: Mutex::new(None),
        })
    }

    /// Chain nodes START -> n1 -> n2 -> ... -> END
    pub fn sequential(
        name: impl Into<String>,
        schema: StateSchema,
        nodes: Vec<Arc<dyn Node>>,
    ) -> Result<Self, WorkflowError> {
        let names: Vec<String> = nodes.iter().map(|n| n.name().to_string()).collect();
        let mut edges = Vec::with_capacity(names.len() + 1);
        let mut previous = START.to_string();
        for next in &names {
            edges.push(Edge::new(previous, next.clone()));
            previous = next.clone();
        }
        if !names.is_empty() {
            edges.push(Edge::new(previous, END));
        }
        Self::new(name, schema, nodes, edges)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node names in execution order
    pub fn execution_order(&self) -> &[String] {
        &self.order
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    /// Run every node and return the final state
    pub async fn invoke(&self, input: Value) -> Result<PipelineState, WorkflowError> {
        self.invoke_with_report(input).await.map(|(state, _)| state)
    }

    /// Like [`invoke`](Self::invoke), abandoning the run after `limit`
    pub async fn invoke_with_timeout(
        &self,
        input: Value,
        limit: Duration,
    ) -> Result<PipelineState, WorkflowError> {
        match tokio::time::timeout(limit, self.invoke(input)).await {
            Ok(result) => result,
            Err(_) => {
                log::error!("Workflow {} timed out after {:?}", self.name, limit);
                Err(WorkflowError::Timeout {
                    workflow: self.name.clone(),
                    elapsed_ms: limit.as_millis(),
                })
            }
        }
    }

    /// Run every node and return the final state with this run's report
    pub async fn invoke_with_report(
        &self,
        input: Value,
    ) -> Result<(PipelineState, WorkflowReport), WorkflowError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        log::info!("Workflow {} run {} started", self.name, run_id);

        let mut state = PipelineState::from_input(&self.schema, input)?;
        let mut statuses: HashMap<&str, NodeStatus> = HashMap::with_capacity(self.order.len());
        let mut metrics: Vec<NodeMetrics> = Vec::with_capacity(self.order.len());

        for node_name in &self.order {
            let node = &self.nodes[node_name];
            let mut node_metrics = NodeMetrics::new(node_name.as_str());

            if !self.should_run(node_name, &state, &statuses) {
                log::info!("Run {}: skipping node {}", run_id, node_name);
                node_metrics.skip();
                statuses.insert(node_name, NodeStatus::Skipped);
                metrics.push(node_metrics);
                continue;
            }

            let result = execute_node(node.as_ref(), &mut state, &mut node_metrics).await;
            statuses.insert(node_name, node_metrics.status);
            metrics.push(node_metrics);

            if let Err(reason) = result {
                log::error!("Run {}: node {} failed: {}", run_id, node_name, reason);
                self.remember(WorkflowReport {
                    workflow: self.name.clone(),
                    run_id,
                    started_at,
                    duration: clock.elapsed(),
                    success: false,
                    nodes: metrics.clone(),
                });
                return Err(WorkflowError::NodeFailed(Box::new(NodeFailure {
                    workflow: self.name.clone(),
                    run_id,
                    node: node_name.clone(),
                    reason,
                    state: state.to_json(),
                    metrics,
                })));
            }
        }

        let report = WorkflowReport {
            workflow: self.name.clone(),
            run_id,
            started_at,
            duration: clock.elapsed(),
            success: true,
            nodes: metrics,
        };
        log::info!(
            "Workflow {} run {} finished in {:?}",
            self.name,
            run_id,
            report.duration
        );
        self.remember(report.clone());
        Ok((state, report))
    }

    /// Report of the most recently finished run, if any
    pub fn get_metrics(&self) -> Option<WorkflowReport> {
        self.last_report
            .lock()
            .ok()
            .and_then(|report| report.clone())
    }

    fn remember(&self, report: WorkflowReport) {
        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report);
        }
    }

    fn should_run(
        &self,
        node_name: &str,
        state: &PipelineState,
        statuses: &HashMap<&str, NodeStatus>,
    ) -> bool {
        let mut incoming = self.edges.iter().filter(|e| e.to == node_name).peekable();
        if incoming.peek().is_none() {
            return true;
        }
        incoming.any(|edge| {
            let source_done = edge.from == START
                || statuses.get(edge.from.as_str()) == Some(&NodeStatus::Success);
            source_done && edge.allows(state)
        })
    }

    /// Human-readable description of the graph
    pub fn visualize(&self) -> String {
        let mut out = format!("Workflow: {}\n", self.name);
        out.push_str("Nodes (execution order):\n");
        for (i, node_name) in self.order.iter().enumerate() {
            let node = &self.nodes[node_name];
            out.push_str(&format!(
                "  {}. {} [{}] requires: {} -> writes: {}\n",
                i + 1,
                node_name,
                node.kind(),
                list_or_none(node.required_keys()),
                list_or_none(node.output_keys()),
            ));
        }
        out.push_str("Edges:\n");
        if self.edges.is_empty() {
            out.push_str("  (none; nodes run in declaration order)\n");
        }
        for edge in &self.edges {
            out.push_str(&format!("  {}\n", edge));
        }
        out
    }
}

fn list_or_none(keys: &[String]) -> String {
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}

/// Kahn's algorithm over node-to-node edges, earliest declared node first
fn topological_order(declared: &[String], edges: &[Edge]) -> Result<Vec<String>, WorkflowError> {
    let mut indegree: HashMap<&str, usize> = declared.iter().map(|n| (n.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for edge in edges.iter().filter(|e| !e.touches_sentinel()) {
        if !seen.insert((edge.from.as_str(), edge.to.as_str())) {
            continue;
        }
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        if let Some(d) = indegree.get_mut(edge.to.as_str()) {
            *d += 1;
        }
    }

    let mut order: Vec<String> = Vec::with_capacity(declared.len());
    let mut placed: HashSet<&str> = HashSet::with_capacity(declared.len());
    while order.len() < declared.len() {
        let next = declared
            .iter()
            .map(String::as_str)
            .find(|n| !placed.contains(n) && indegree.get(n) == Some(&0));
        let Some(next) = next else {
            let remaining: Vec<String> = declared
                .iter()
                .filter(|n| !placed.contains(n.as_str()))
                .cloned()
                .collect();
            return Err(WorkflowError::CircularDependency(remaining));
        };
        placed.insert(next);
        order.push(next.to_string());
        for succ in successors.get(next).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(succ) {
                *d -= 1;
            }
        }
    }
    Ok(order)
}
