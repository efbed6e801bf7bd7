//! Shared domain types for pipeloom.
//!
//! Workflow wire format and typed node configuration, execution events and
//! results, LLM request types and global configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod llm;
pub mod workflow;
