//! Structural validation of a workflow graph.
//!
//! `validate` is pure and collects every violation instead of stopping at the
//! first one. A report with no errors is valid regardless of warnings.

use std::collections::HashSet;

use pipeloom_types::execution::ValidationReport;
use pipeloom_types::workflow::NodeType;

use super::graph::{Graph, Node};

/// Check topology and per-type connection rules.
pub fn validate(graph: &Graph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.is_empty() {
        errors.push("workflow has no nodes".to_string());
        return ValidationReport::new(errors, warnings);
    }

    check_ids(graph, &mut errors);
    check_edges(graph, &mut errors, &mut warnings);

    let outputs = graph.nodes_of_type(NodeType::Output).count();
    if outputs != 1 {
        errors.push(format!("workflow must have exactly one output node, found {outputs}"));
    }
    if graph.nodes_of_type(NodeType::Input).next().is_none() {
        errors.push("workflow must have at least one input node".to_string());
    }

    for node in graph.nodes() {
        check_node(graph, node, &mut errors, &mut warnings);
    }

    if let Some(node_id) = graph.find_cycle() {
        errors.push(format!("cycle detected involving node '{node_id}'"));
    }

    ValidationReport::new(errors, warnings)
}

fn check_ids(graph: &Graph, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for node in graph.nodes() {
        if node.id.trim().is_empty() {
            errors.push("node with empty id".to_string());
        }
        if !seen.insert(node.id.as_str()) && reported.insert(node.id.as_str()) {
            errors.push(format!("duplicate node id '{}'", node.id));
        }
    }
}

fn check_edges(graph: &Graph, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    for edge in graph.edges() {
        let label = format!("'{}' -> '{}'", edge.source, edge.target);
        if !graph.contains(&edge.source) {
            errors.push(format!("edge {label} references unknown source node '{}'", edge.source));
        }
        if !graph.contains(&edge.target) {
            errors.push(format!("edge {label} references unknown target node '{}'", edge.target));
        }
        if edge.source == edge.target {
            errors.push(format!("edge {label} is a self-loop"));
        }
    }
    for edge in graph.duplicate_edges() {
        warnings.push(format!(
            "duplicate edge '{}' -> '{}' ignored",
            edge.source, edge.target
        ));
    }
}

fn check_node(graph: &Graph, node: &Node, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    let id = node.id.as_str();
    let node_type = node.node_type();
    let preds: Vec<NodeType> = graph
        .predecessors(id)
        .iter()
        .filter_map(|p| graph.node(p).map(Node::node_type))
        .collect();
    let succ_count = graph.successors(id).len();
    let count = |t: NodeType| preds.iter().filter(|&&p| p == t).count();

    match node_type {
        NodeType::Input => {
            if !preds.is_empty() {
                errors.push(format!("input node '{id}' must not have predecessors"));
            }
            if succ_count == 0 {
                errors.push(format!("input node '{id}' must have at least one successor"));
            }
        }
        NodeType::Output => {
            if succ_count > 0 {
                errors.push(format!("output node '{id}' must not have successors"));
            }
            if preds.is_empty() {
                errors.push(format!("output node '{id}' must have at least one predecessor"));
            }
        }
        NodeType::Context => {
            if !preds.is_empty() && count(NodeType::Input) == 0 {
                errors.push(format!(
                    "context node '{id}' must have an input node among its predecessors"
                ));
            }
            if succ_count == 0 {
                errors.push(format!("context node '{id}' must have at least one successor"));
            }
        }
        NodeType::Generation => {
            for (pred_id, pred_type) in graph.predecessors(id).iter().zip(&preds) {
                if !matches!(pred_type, NodeType::Input | NodeType::Context) {
                    errors.push(format!(
                        "generation node '{id}' cannot take input from {pred_type} node '{pred_id}'"
                    ));
                }
            }
            if count(NodeType::Input) > 1 {
                errors.push(format!(
                    "generation node '{id}' can have at most one input predecessor"
                ));
            }
            if preds.is_empty() {
                errors.push(format!("generation node '{id}' must have at least one predecessor"));
            }
            if succ_count == 0 {
                errors.push(format!("generation node '{id}' must have at least one successor"));
            }
        }
        NodeType::Ensemble | NodeType::Validation => {
            if count(NodeType::Output) > 0 {
                errors.push(format!(
                    "{node_type} node '{id}' cannot take input from an output node"
                ));
            }
            if node_type == NodeType::Validation {
                let non_context = preds.iter().filter(|&&p| p != NodeType::Context).count();
                if non_context > 1 {
                    errors.push(format!(
                        "validation node '{id}' can have at most one non-context predecessor, found {non_context}"
                    ));
                }
            }
            if preds.is_empty() {
                warnings.push(format!("{node_type} node '{id}' has no predecessors"));
            }
            if succ_count == 0 {
                warnings.push(format!("{node_type} node '{id}' has no successors"));
            }
        }
    }

    if succ_count > 1 && !node_type.can_fan_out() && node_type != NodeType::Output {
        errors.push(format!(
            "{node_type} node '{id}' can have at most one successor, found {succ_count}"
        ));
    }
}
