//! Execution result types shared by the engine, the CLI and the HTTP layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a structural validation pass.
///
/// A report with no errors is valid regardless of how many warnings it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// The recorded outcome of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionResult {
    pub node_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl NodeExecutionResult {
    pub fn succeeded(node_id: impl Into<String>, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            success: true,
            output: Some(output.into()),
            error: None,
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(node_id: impl Into<String>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Non-streaming result of a whole workflow run.
///
/// Equivalent to draining the event stream to its terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub run_id: Uuid,
    pub success: bool,
    /// Per-node results in completion order (cancelled nodes last).
    pub results: Vec<NodeExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    pub total_execution_time_ms: u64,
    pub execution_order: Vec<String>,
    /// Set when the run ended because `stop()` was requested.
    #[serde(default)]
    pub was_stopped: bool,
    /// Failure message naming the failing node, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecutionResult {
    /// Result recorded for `node_id`, if it finished (or was cancelled).
    pub fn result_for(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.results.iter().find(|r| r.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_validity_ignores_warnings() {
        let report = ValidationReport::new(vec![], vec!["duplicate edge".to_string()]);
        assert!(report.valid);

        let report = ValidationReport::new(vec!["no output node".to_string()], vec![]);
        assert!(!report.valid);
    }

    #[test]
    fn node_result_constructors() {
        let ok = NodeExecutionResult::succeeded("a", "hello", Duration::from_millis(12));
        assert!(ok.success);
        assert_eq!(ok.output.as_deref(), Some("hello"));
        assert_eq!(ok.execution_time_ms, 12);

        let err = NodeExecutionResult::failed("b", "boom", Duration::from_millis(3));
        assert!(!err.success);
        assert!(err.output.is_none());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn failed_result_omits_output_when_serialized() {
        let err = NodeExecutionResult::failed("b", "boom", Duration::ZERO);
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("output").is_none());
        assert_eq!(json["error"], "boom");
    }
}
