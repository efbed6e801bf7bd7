//! Workflow document parsing and filesystem loading.
//!
//! Converts JSON or YAML text into the wire-level `WorkflowDocument`. Typed
//! node configuration and structural rules are checked later, by
//! `Graph::from_document` and the validator respectively.

use std::path::Path;

use pipeloom_types::workflow::WorkflowDocument;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A node's `config` payload does not match its type.
    #[error("invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    /// The file extension is not one we know how to parse.
    #[error("unsupported workflow format: {0}")]
    UnsupportedFormat(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON workflow document.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDocument, WorkflowError> {
    serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Parse a YAML workflow document.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDocument, WorkflowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow document from a `.json`, `.yaml` or `.yml` file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDocument, WorkflowError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let content = std::fs::read_to_string(path)?;
    match ext.as_str() {
        "json" => parse_workflow_json(&content),
        "yaml" | "yml" => parse_workflow_yaml(&content),
        _ => Err(WorkflowError::UnsupportedFormat(path.display().to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
