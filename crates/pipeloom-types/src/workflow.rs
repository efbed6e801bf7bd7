//! Workflow domain types for pipeloom.
//!
//! Two layers live here:
//! - the wire contract (`WorkflowDocument`, `NodeSpec`, `EdgeSpec`) exactly as a
//!   workflow source or the visual editor submits it, with each node's
//!   `config` still an untyped JSON payload;
//! - the typed per-node configuration (`NodeConfig`) that the graph model
//!   produces from the raw payload at load time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Node type
// ---------------------------------------------------------------------------

/// The closed set of node kinds a workflow may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Generation,
    Ensemble,
    Validation,
    Context,
    Output,
}

impl NodeType {
    /// All node types, in declaration order.
    pub const ALL: [NodeType; 6] = [
        NodeType::Input,
        NodeType::Generation,
        NodeType::Ensemble,
        NodeType::Validation,
        NodeType::Context,
        NodeType::Output,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Input => "input",
            NodeType::Generation => "generation",
            NodeType::Ensemble => "ensemble",
            NodeType::Validation => "validation",
            NodeType::Context => "context",
            NodeType::Output => "output",
        }
    }

    /// Whether nodes of this type may feed more than one successor.
    pub fn can_fan_out(&self) -> bool {
        matches!(self, NodeType::Input | NodeType::Context)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("invalid node type: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Wire contract
// ---------------------------------------------------------------------------

/// A workflow as submitted by a workflow source: nodes plus directed edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDocument {
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// A single node on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Raw per-type configuration. The visual editor ships it as `data`.
    #[serde(default, alias = "data")]
    pub config: Value,
}

/// A directed edge on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

// ---------------------------------------------------------------------------
// Typed node configuration
// ---------------------------------------------------------------------------

/// Per-type node configuration, validated when the graph is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    Input(InputConfig),
    Generation(LlmNodeConfig),
    Ensemble(LlmNodeConfig),
    Validation(LlmNodeConfig),
    Context(ContextConfig),
    Output(OutputConfig),
}

impl NodeConfig {
    /// Parse a raw `config` payload for a node of the given type.
    ///
    /// A missing (`null`) payload is treated as an empty object so that node
    /// types whose fields are all optional need no config at all.
    pub fn from_raw(node_type: NodeType, raw: &Value) -> Result<Self, serde_json::Error> {
        let raw = match raw {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        Ok(match node_type {
            NodeType::Input => NodeConfig::Input(serde_json::from_value(raw)?),
            NodeType::Generation => NodeConfig::Generation(serde_json::from_value(raw)?),
            NodeType::Ensemble => NodeConfig::Ensemble(serde_json::from_value(raw)?),
            NodeType::Validation => NodeConfig::Validation(serde_json::from_value(raw)?),
            NodeType::Context => NodeConfig::Context(serde_json::from_value(raw)?),
            NodeType::Output => NodeConfig::Output(serde_json::from_value(raw)?),
        })
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Input(_) => NodeType::Input,
            NodeConfig::Generation(_) => NodeType::Generation,
            NodeConfig::Ensemble(_) => NodeType::Ensemble,
            NodeConfig::Validation(_) => NodeType::Validation,
            NodeConfig::Context(_) => NodeType::Context,
            NodeConfig::Output(_) => NodeType::Output,
        }
    }
}

/// Configuration of an `input` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Used when a run is started with an empty input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Configuration shared by the LLM-backed node types
/// (`generation`, `ensemble`, `validation`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmNodeConfig {
    /// Instruction sent as the system text of the completion request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Model override; the provider's configured model is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Configuration of a `context` (retrieval) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Name of the knowledge base to retrieve from.
    pub knowledge_base: String,
    /// Upper bound on retrieved characters; the retriever default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<usize>,
}

/// Configuration of the `output` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub combine: OutputCombine,
}

/// How the output node merges several predecessor outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCombine {
    /// Join all predecessor outputs with a blank line, in predecessor order.
    #[default]
    Concatenate,
    /// Keep only the last predecessor's output.
    Last,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_type_roundtrips_through_str() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("router".parse::<NodeType>().is_err());
    }

    #[test]
    fn only_input_and_context_fan_out() {
        let fan_out: Vec<NodeType> = NodeType::ALL.into_iter().filter(|t| t.can_fan_out()).collect();
        assert_eq!(fan_out, vec![NodeType::Input, NodeType::Context]);
    }

    #[test]
    fn document_deserializes_wire_format() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "nodes": [
                { "id": "in", "type": "input", "config": {} },
                { "id": "out", "type": "output" }
            ],
            "edges": [{ "id": "e1", "source": "in", "target": "out" }]
        }))
        .unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[1].node_type, NodeType::Output);
        assert!(doc.nodes[1].config.is_null());
        assert_eq!(doc.edges[0].id.as_deref(), Some("e1"));
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let result: Result<NodeSpec, _> =
            serde_json::from_value(json!({ "id": "x", "type": "router" }));
        assert!(result.is_err());
    }

    #[test]
    fn data_alias_is_accepted_for_config() {
        let node: NodeSpec = serde_json::from_value(json!({
            "id": "ctx",
            "type": "context",
            "data": { "knowledge_base": "docs" }
        }))
        .unwrap();
        assert_eq!(node.config["knowledge_base"], "docs");
    }

    #[test]
    fn config_from_null_uses_defaults() {
        let cfg = NodeConfig::from_raw(NodeType::Output, &Value::Null).unwrap();
        assert_eq!(
            cfg,
            NodeConfig::Output(OutputConfig {
                combine: OutputCombine::Concatenate
            })
        );
        assert_eq!(cfg.node_type(), NodeType::Output);
    }

    #[test]
    fn context_config_requires_knowledge_base() {
        let err = NodeConfig::from_raw(NodeType::Context, &json!({})).unwrap_err();
        assert!(err.to_string().contains("knowledge_base"));
    }

    #[test]
    fn llm_config_parses_all_fields() {
        let cfg = NodeConfig::from_raw(
            NodeType::Generation,
            &json!({ "prompt": "Summarize", "model": "m", "temperature": 0.2, "max_tokens": 64 }),
        )
        .unwrap();
        match cfg {
            NodeConfig::Generation(c) => {
                assert_eq!(c.prompt.as_deref(), Some("Summarize"));
                assert_eq!(c.model.as_deref(), Some("m"));
                assert_eq!(c.max_tokens, Some(64));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn output_combine_parses_last() {
        let cfg = NodeConfig::from_raw(NodeType::Output, &json!({ "combine": "last" })).unwrap();
        assert_eq!(
            cfg,
            NodeConfig::Output(OutputConfig {
                combine: OutputCombine::Last
            })
        );
    }
}
