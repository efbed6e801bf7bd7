//! Events emitted by the execution engine during a workflow run.
//!
//! `ExecutionEvent` is the unit a transport layer (SSE, WebSocket, CLI
//! printer) consumes. Every run yields exactly one `start`, then node
//! lifecycle events, then exactly one terminal event (`complete` or `error`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{NodeExecutionResult, WorkflowExecutionResult};
use crate::workflow::NodeType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The run has begun.
    Start { run_id: Uuid, total_nodes: usize },

    /// A node became ready and its task was launched.
    NodeStart { node_id: String, node_type: NodeType },

    /// A partial output fragment from a running node.
    Stream { node_id: String, content: String },

    /// A node reached its terminal state.
    NodeComplete {
        node_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        execution_time_ms: u64,
    },

    /// The coordinator observed a stop request and is draining.
    StopRequested { message: String },

    /// The run finished normally (possibly after a stop).
    Complete {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_output: Option<String>,
        execution_order: Vec<String>,
        results: Vec<NodeExecutionResult>,
        total_execution_time_ms: u64,
        was_stopped: bool,
    },

    /// The run was aborted.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },
}

impl ExecutionEvent {
    /// The wire discriminator, also used as the SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::Start { .. } => "start",
            ExecutionEvent::NodeStart { .. } => "node_start",
            ExecutionEvent::Stream { .. } => "stream",
            ExecutionEvent::NodeComplete { .. } => "node_complete",
            ExecutionEvent::StopRequested { .. } => "stop_requested",
            ExecutionEvent::Complete { .. } => "complete",
            ExecutionEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::Complete { .. } | ExecutionEvent::Error { .. })
    }

    pub fn node_complete(result: &NodeExecutionResult) -> Self {
        ExecutionEvent::NodeComplete {
            node_id: result.node_id.clone(),
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
            execution_time_ms: result.execution_time_ms,
        }
    }

    /// Terminal event for a finished run.
    pub fn terminal(result: &WorkflowExecutionResult, failed_node: Option<&str>) -> Self {
        match (&result.error, result.success) {
            (Some(message), false) => ExecutionEvent::Error {
                message: message.clone(),
                node_id: failed_node.map(str::to_string),
            },
            _ => ExecutionEvent::Complete {
                success: result.success,
                final_output: result.final_output.clone(),
                execution_order: result.execution_order.clone(),
                results: result.results.clone(),
                total_execution_time_ms: result.total_execution_time_ms,
                was_stopped: result.was_stopped,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_type_tag() {
        let event = ExecutionEvent::NodeStart {
            node_id: "gen".to_string(),
            node_type: NodeType::Generation,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_start");
        assert_eq!(json["node_type"], "generation");
        assert_eq!(event.event_type(), "node_start");
    }

    #[test]
    fn stop_requested_tag() {
        let event = ExecutionEvent::StopRequested {
            message: "stopping".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stop_requested");
        assert!(!event.is_terminal());
    }

    #[test]
    fn terminal_for_failed_run_is_error() {
        let result = WorkflowExecutionResult {
            run_id: Uuid::nil(),
            success: false,
            results: vec![],
            final_output: None,
            total_execution_time_ms: 5,
            execution_order: vec![],
            was_stopped: false,
            error: Some("node 'gen' failed: boom".to_string()),
        };
        let event = ExecutionEvent::terminal(&result, Some("gen"));
        assert!(event.is_terminal());
        match event {
            ExecutionEvent::Error { message, node_id } => {
                assert!(message.contains("gen"));
                assert_eq!(node_id.as_deref(), Some("gen"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn terminal_for_stopped_run_is_complete() {
        let result = WorkflowExecutionResult {
            run_id: Uuid::nil(),
            success: true,
            results: vec![],
            final_output: None,
            total_execution_time_ms: 5,
            execution_order: vec!["in".to_string()],
            was_stopped: true,
            error: None,
        };
        match ExecutionEvent::terminal(&result, None) {
            ExecutionEvent::Complete {
                success,
                was_stopped,
                ..
            } => {
                assert!(success);
                assert!(was_stopped);
            }
            other => panic!("expected complete event, got {other:?}"),
        }
    }
}
