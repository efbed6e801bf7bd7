//! Immutable workflow graph with derived adjacency maps.
//!
//! A `Graph` can be built from structurally broken input (duplicate ids,
//! dangling edges, self-loops) so that the validator can report every
//! problem at once. Only edges whose endpoints exist, that are not
//! self-loops and that are not duplicates enter the predecessor and
//! successor maps.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use pipeloom_types::workflow::{EdgeSpec, NodeConfig, NodeType, WorkflowDocument};

use super::definition::WorkflowError;

/// A node with its typed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

/// A directed edge between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl From<&EdgeSpec> for Edge {
    fn from(spec: &EdgeSpec) -> Self {
        Edge::new(spec.source.clone(), spec.target.clone())
    }
}

/// Nodes, edges and the adjacency maps derived from them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    predecessors: HashMap<String, Vec<String>>,
    successors: HashMap<String, Vec<String>>,
    duplicate_edges: Vec<Edge>,
}

impl Graph {
    /// Build a graph. Adjacency lists keep edge declaration order.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            // first occurrence wins; duplicates are a validation error
            index.entry(node.id.clone()).or_insert(i);
        }

        let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut duplicate_edges = Vec::new();

        for edge in &edges {
            if !index.contains_key(&edge.source)
                || !index.contains_key(&edge.target)
                || edge.source == edge.target
            {
                continue;
            }
            if !seen.insert((edge.source.as_str(), edge.target.as_str())) {
                duplicate_edges.push(edge.clone());
                continue;
            }
            successors
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            predecessors
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }

        Self {
            nodes,
            edges,
            index,
            predecessors,
            successors,
            duplicate_edges,
        }
    }

    /// Build a graph from a wire document, parsing every node's config.
    pub fn from_document(doc: &WorkflowDocument) -> Result<Self, WorkflowError> {
        let nodes = doc
            .nodes
            .iter()
            .map(|spec| {
                NodeConfig::from_raw(spec.node_type, &spec.config)
                    .map(|config| Node::new(spec.id.clone(), config))
                    .map_err(|e| WorkflowError::InvalidNodeConfig {
                        node_id: spec.id.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let edges = doc.edges.iter().map(Edge::from).collect();
        Ok(Self::new(nodes, edges))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges as declared, including invalid and duplicate ones.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Predecessor ids of `id`; empty when the node has none or is unknown.
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Successor ids of `id`; empty when the node has none or is unknown.
    pub fn successors(&self, id: &str) -> &[String] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges dropped because an identical edge was declared earlier.
    pub fn duplicate_edges(&self) -> &[Edge] {
        &self.duplicate_edges
    }

    /// Nodes with no predecessors, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| self.predecessors(&n.id).is_empty())
    }

    /// Nodes of the given type, in declaration order.
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(move |n| n.node_type() == node_type)
    }

    /// Returns the id of a node on a directed cycle, if any exists.
    pub fn find_cycle(&self) -> Option<&str> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = HashMap::new();
        for id in self.index.keys() {
            indices.insert(id.as_str(), graph.add_node(id.as_str()));
        }
        for (source, targets) in &self.successors {
            for target in targets {
                graph.add_edge(indices[source.as_str()], indices[target.as_str()], ());
            }
        }
        toposort(&graph, None)
            .err()
            .map(|cycle| graph[cycle.node_id()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeloom_types::workflow::{InputConfig, LlmNodeConfig, OutputConfig};
    use serde_json::json;

    fn input(id: &str) -> Node {
        Node::new(id, NodeConfig::Input(InputConfig::default()))
    }

    fn generation(id: &str) -> Node {
        Node::new(id, NodeConfig::Generation(LlmNodeConfig::default()))
    }

    fn output(id: &str) -> Node {
        Node::new(id, NodeConfig::Output(OutputConfig::default()))
    }

    #[test]
    fn adjacency_maps_are_total() {
        let graph = Graph::new(
            vec![input("in"), generation("gen"), output("out")],
            vec![Edge::new("in", "gen"), Edge::new("gen", "out")],
        );
        assert_eq!(graph.predecessors("gen"), ["in".to_string()]);
        assert_eq!(graph.successors("gen"), ["out".to_string()]);
        assert!(graph.predecessors("in").is_empty());
        assert!(graph.successors("missing").is_empty());
        assert_eq!(graph.roots().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["in"]);
    }

    #[test]
    fn dangling_and_self_loop_edges_stay_out_of_adjacency() {
        let graph = Graph::new(
            vec![input("in"), output("out")],
            vec![
                Edge::new("in", "ghost"),
                Edge::new("out", "out"),
                Edge::new("in", "out"),
            ],
        );
        assert_eq!(graph.edges().len(), 3);
        assert_eq!(graph.successors("in"), ["out".to_string()]);
        assert!(graph.successors("out").is_empty());
    }

    #[test]
    fn duplicate_edges_are_deduplicated() {
        let graph = Graph::new(
            vec![input("in"), output("out")],
            vec![Edge::new("in", "out"), Edge::new("in", "out")],
        );
        assert_eq!(graph.predecessors("out").len(), 1);
        assert_eq!(graph.duplicate_edges(), [Edge::new("in", "out")]);
    }

    #[test]
    fn cycle_is_found() {
        let graph = Graph::new(
            vec![generation("a"), generation("b"), output("out")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );
        let on_cycle = graph.find_cycle().unwrap();
        assert!(on_cycle == "a" || on_cycle == "b");

        let acyclic = Graph::new(vec![input("in"), output("out")], vec![Edge::new("in", "out")]);
        assert!(acyclic.find_cycle().is_none());
    }

    #[test]
    fn from_document_parses_configs() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "nodes": [
                { "id": "in", "type": "input", "config": { "default_value": "hi" } },
                { "id": "out", "type": "output", "config": { "combine": "last" } }
            ],
            "edges": [{ "source": "in", "target": "out" }]
        }))
        .unwrap();
        let graph = Graph::from_document(&doc).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.node("in").unwrap().node_type(), NodeType::Input);
        assert!(graph.contains("out"));
    }

    #[test]
    fn from_document_rejects_bad_config() {
        let doc: WorkflowDocument = serde_json::from_value(json!({
            "nodes": [{ "id": "ctx", "type": "context", "config": { "max_chars": 10 } }]
        }))
        .unwrap();
        match Graph::from_document(&doc) {
            Err(WorkflowError::InvalidNodeConfig { node_id, .. }) => assert_eq!(node_id, "ctx"),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
