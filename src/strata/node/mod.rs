// SPDX-License-Identifier: MIT

//! Node module - pipeline stages
//!
//! This module provides the core Node trait and implementations:
//! - `IntelligenceNode` - free-form reasoning over a prompt template
//! - `ExtractionNode` - structured extraction with a repair cascade
//! - `ValidationNode` - schema validation in one of three modes
//!
//! Nodes are stateless: everything scoped to one call (metrics, history,
//! intermediate text) is passed in or returned, never stored on `self`.

mod extraction;
mod intelligence;
mod metrics;
mod validation;

pub use extraction::ExtractionNode;
pub use intelligence::IntelligenceNode;
pub use metrics::{NodeMetrics, NodeStatus};
pub use validation::ValidationNode;

use crate::strata::error::NodeError;
use crate::strata::state::{PipelineState, StateUpdate};
use async_trait::async_trait;

/// Core node trait for all pipeline stages
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within a workflow
    fn name(&self) -> &str;

    /// Short label used by `Workflow::visualize`
    fn kind(&self) -> &str {
        "custom"
    }

    /// State keys that must be present before `execute` is called
    fn required_keys(&self) -> &[String];

    /// State keys guaranteed to be present after a successful `execute`
    fn output_keys(&self) -> &[String];

    /// Required keys absent from `state`
    fn missing_keys(&self, state: &PipelineState) -> Vec<String> {
        self.required_keys()
            .iter()
            .filter(|k| !state.contains(k))
            .cloned()
            .collect()
    }

    /// Must return true before `execute` may be called
    fn validate_input(&self, state: &PipelineState) -> bool {
        self.missing_keys(state).is_empty()
    }

    /// Do the work and return the keys this node adds
    async fn execute(
        &self,
        state: &PipelineState,
        metrics: &mut NodeMetrics,
    ) -> Result<StateUpdate, NodeError>;

    /// Called with the error from `execute`; may recover with an update
    async fn on_error(
        &self,
        error: NodeError,
        _state: &PipelineState,
        _metrics: &mut NodeMetrics,
    ) -> Result<StateUpdate, NodeError> {
        log::error!("Node {} failed: {}", self.name(), error);
        Err(error)
    }
}

/// Run one node against `state`: precondition check, execution with error
/// recovery, update application and output-contract check.
///
/// On error the state is left untouched and the metrics record the failure.
pub async fn execute_node(
    node: &dyn Node,
    state: &mut PipelineState,
    metrics: &mut NodeMetrics,
) -> Result<(), NodeError> {
    let missing = node.missing_keys(state);
    if !missing.is_empty() {
        let err = NodeError::precondition(node.name(), missing);
        metrics.fail(&err);
        return Err(err);
    }

    metrics.start(node.required_keys().to_vec());
    log::info!("Executing node: {}", node.name());

    let update = match node.execute(state, metrics).await {
        Ok(update) => update,
        Err(err) => match node.on_error(err, state, metrics).await {
            Ok(recovered) => {
                log::info!("Node {} recovered from error", node.name());
                recovered
            }
            Err(err) => {
                metrics.fail(&err);
                return Err(err);
            }
        },
    };

    let mut candidate = state.clone();
    let written = match candidate.apply(node.name(), update) {
        Ok(written) => written,
        Err(err) => {
            let err = NodeError::from(err);
            metrics.fail(&err);
            return Err(err);
        }
    };

    if let Some(key) = node.output_keys().iter().find(|k| !candidate.contains(k)) {
        let err = NodeError::MissingOutput {
            node: node.name().to_string(),
            key: key.clone(),
        };
        metrics.fail(&err);
        return Err(err);
    }

    *state = candidate;
    metrics.succeed(written);
    log::info!(
        "Node {} completed in {:?}",
        node.name(),
        metrics.duration
    );
    Ok(())
}

/// Run a node on its own, outside any workflow
pub async fn run_node(
    node: &dyn Node,
    state: PipelineState,
) -> Result<(PipelineState, NodeMetrics), NodeError> {
    let mut state = state;
    let mut metrics = NodeMetrics::new(node.name());
    execute_node(node, &mut state, &mut metrics).await?;
    Ok((state, metrics))
}
