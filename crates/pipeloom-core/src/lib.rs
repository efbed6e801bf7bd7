//! Workflow graph model, validation, and the streaming execution engine.
//!
//! This crate defines the ports (`LlmProvider`, `ContextRetriever`,
//! `NodeExecutor`) that the infrastructure layer implements. It depends only
//! on `pipeloom-types`, never on `pipeloom-infra` or any HTTP crate.

pub mod llm;
pub mod workflow;
