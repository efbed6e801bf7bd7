use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a node executor can report for a single node.
///
/// Cloneable so the same failure can be logged, recorded in the node's
/// result and carried by the terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum NodeError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("llm call failed: {0}")]
    Llm(String),

    #[error("context retrieval failed: {0}")]
    Retrieval(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}
