//! Per-run bookkeeping owned by the engine's coordinator.
//!
//! Every node id is in exactly one of: not started, `active`, `completed`.
//! `outputs` is write-once per node.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use pipeloom_types::error::NodeError;
use pipeloom_types::execution::NodeExecutionResult;
use pipeloom_types::workflow::NodeType;
use tokio::task::AbortHandle;

use super::engine::EngineError;
use super::graph::Graph;

/// A launched node that has not reported a terminal event yet.
#[derive(Debug)]
pub struct ActiveNode {
    pub started: Instant,
    pub abort: AbortHandle,
}

#[derive(Debug, Default)]
pub struct ExecutionState {
    completed: HashSet<String>,
    outputs: HashMap<String, String>,
    order: Vec<String>,
    active: HashMap<String, ActiveNode>,
    results: Vec<NodeExecutionResult>,
    stopping: bool,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, node_id: &str) -> bool {
        self.active.contains_key(node_id)
    }

    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed.contains(node_id)
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    /// Ids of active nodes, sorted for deterministic reporting.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn set_stopping(&mut self) {
        self.stopping = true;
    }

    pub fn output(&self, node_id: &str) -> Option<&str> {
        self.outputs.get(node_id).map(String::as_str)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn results(&self) -> &[NodeExecutionResult] {
        &self.results
    }

    pub fn mark_active(&mut self, node_id: &str, abort: AbortHandle) -> Result<(), EngineError> {
        if self.is_active(node_id) || self.is_completed(node_id) {
            return Err(EngineError::Dependency(format!(
                "node '{node_id}' launched twice"
            )));
        }
        self.active.insert(
            node_id.to_string(),
            ActiveNode {
                started: Instant::now(),
                abort,
            },
        );
        Ok(())
    }

    /// Move an active node to `completed` and store its output.
    pub fn record_success(
        &mut self,
        node_id: &str,
        output: String,
    ) -> Result<&NodeExecutionResult, EngineError> {
        let active = self.take_active(node_id)?;
        if self.outputs.contains_key(node_id) {
            return Err(EngineError::Dependency(format!(
                "output for node '{node_id}' written twice"
            )));
        }
        let result = NodeExecutionResult::succeeded(node_id, output.clone(), active.started.elapsed());
        self.outputs.insert(node_id.to_string(), output);
        self.completed.insert(node_id.to_string());
        self.order.push(node_id.to_string());
        Ok(self.push_result(result))
    }

    /// Remove an active node and record it as failed.
    pub fn record_failure(
        &mut self,
        node_id: &str,
        error: &NodeError,
    ) -> Result<&NodeExecutionResult, EngineError> {
        let active = self.take_active(node_id)?;
        let result = NodeExecutionResult::failed(node_id, error.to_string(), active.started.elapsed());
        Ok(self.push_result(result))
    }

    /// Abort every active node and record each as cancelled.
    pub fn cancel_active(&mut self, reason: &str) -> Vec<NodeExecutionResult> {
        let error = NodeError::Cancelled(reason.to_string());
        let mut cancelled = Vec::new();
        for node_id in self.active_ids() {
            if let Some(active) = self.active.remove(&node_id) {
                active.abort.abort();
                let result = NodeExecutionResult::failed(
                    node_id,
                    error.to_string(),
                    active.started.elapsed(),
                );
                cancelled.push(self.push_result(result).clone());
            }
        }
        cancelled
    }

    /// Whether every predecessor of `node_id` has completed.
    pub fn is_ready(&self, graph: &Graph, node_id: &str) -> Result<bool, EngineError> {
        if !graph.contains(node_id) {
            return Err(EngineError::Dependency(format!(
                "readiness check for unknown node '{node_id}'"
            )));
        }
        Ok(graph
            .predecessors(node_id)
            .iter()
            .all(|p| self.completed.contains(p)))
    }

    /// Successors of `node_id` that are now ready and not yet started.
    pub fn ready_successors(&self, graph: &Graph, node_id: &str) -> Result<Vec<String>, EngineError> {
        let mut ready = Vec::new();
        for succ in graph.successors(node_id) {
            if self.is_active(succ) || self.is_completed(succ) {
                continue;
            }
            if self.is_ready(graph, succ)? {
                ready.push(succ.clone());
            }
        }
        Ok(ready)
    }

    /// Inputs handed to the executor for `node_id`.
    ///
    /// Input nodes receive the run input; every other node receives its
    /// predecessors' outputs in predecessor order.
    pub fn inputs_for(&self, graph: &Graph, node_id: &str, run_input: &str) -> Vec<String> {
        match graph.node(node_id).map(|n| n.node_type()) {
            Some(NodeType::Input) => vec![run_input.to_string()],
            _ => graph
                .predecessors(node_id)
                .iter()
                .filter_map(|p| self.outputs.get(p).cloned())
                .collect(),
        }
    }

    fn take_active(&mut self, node_id: &str) -> Result<ActiveNode, EngineError> {
        self.active.remove(node_id).ok_or_else(|| {
            EngineError::Dependency(format!("terminal event for inactive node '{node_id}'"))
        })
    }

    fn push_result(&mut self, result: NodeExecutionResult) -> &NodeExecutionResult {
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::{Edge, Node};
    use pipeloom_types::workflow::{InputConfig, LlmNodeConfig, NodeConfig, OutputConfig};

    fn diamond() -> Graph {
        Graph::new(
            vec![
                Node::new("in", NodeConfig::Input(InputConfig::default())),
                Node::new("a", NodeConfig::Generation(LlmNodeConfig::default())),
                Node::new("b", NodeConfig::Generation(LlmNodeConfig::default())),
                Node::new("c", NodeConfig::Ensemble(LlmNodeConfig::default())),
                Node::new("out", NodeConfig::Output(OutputConfig::default())),
            ],
            vec![
                Edge::new("in", "a"),
                Edge::new("in", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "c"),
                Edge::new("c", "out"),
            ],
        )
    }

    fn abort_handle() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn readiness_follows_completion() {
        let graph = diamond();
        let mut state = ExecutionState::new();

        state.mark_active("in", abort_handle()).unwrap();
        state.record_success("in", "q".to_string()).unwrap();
        assert_eq!(state.ready_successors(&graph, "in").unwrap(), ["a", "b"]);

        state.mark_active("a", abort_handle()).unwrap();
        state.mark_active("b", abort_handle()).unwrap();
        state.record_success("a", "A".to_string()).unwrap();
        assert!(state.ready_successors(&graph, "a").unwrap().is_empty());

        state.record_success("b", "B".to_string()).unwrap();
        assert_eq!(state.ready_successors(&graph, "b").unwrap(), ["c"]);
        assert_eq!(state.inputs_for(&graph, "c", "q"), ["A", "B"]);
        assert_eq!(state.inputs_for(&graph, "in", "q"), ["q"]);
        assert_eq!(state.order(), ["in", "a", "b"]);
        assert_eq!(state.completed_count(), 3);
    }

    #[tokio::test]
    async fn node_cannot_be_launched_twice() {
        let mut state = ExecutionState::new();
        state.mark_active("in", abort_handle()).unwrap();
        assert!(state.mark_active("in", abort_handle()).is_err());
        state.record_success("in", "x".to_string()).unwrap();
        assert!(state.mark_active("in", abort_handle()).is_err());
        assert!(state.record_success("in", "y".to_string()).is_err());
        assert_eq!(state.output("in"), Some("x"));
    }

    #[tokio::test]
    async fn unknown_node_is_a_dependency_error() {
        let state = ExecutionState::new();
        let err = state.is_ready(&diamond(), "ghost").unwrap_err();
        assert!(matches!(err, EngineError::Dependency(_)));
    }

    #[tokio::test]
    async fn cancel_active_records_failures() {
        let mut state = ExecutionState::new();
        state.mark_active("a", abort_handle()).unwrap();
        state.mark_active("b", abort_handle()).unwrap();
        state.record_failure("a", &NodeError::Llm("boom".to_string())).unwrap();

        let cancelled = state.cancel_active("fail-fast");
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].node_id, "b");
        assert!(cancelled[0].error.as_deref().unwrap().contains("cancelled"));
        assert!(!state.has_active());
        assert_eq!(state.results().len(), 2);
        assert!(state.order().is_empty());
    }
}
