//! Workflow graph model, validation and execution.
//!
//! - `definition`: JSON/YAML workflow documents and file loading
//! - `graph`: immutable nodes and edges with adjacency maps
//! - `validator`: structural rules checked before any run
//! - `engine`: dependency-driven streaming scheduler
//! - `executor`: the node executor contract
//! - `node_runner`: default executor backed by an LLM provider and a retriever

pub mod definition;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod node_runner;
pub mod retriever;
pub mod state;
pub mod validator;
