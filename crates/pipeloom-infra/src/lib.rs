//! Infrastructure layer for pipeloom.
//!
//! Implements the ports defined in `pipeloom-core`: LLM providers
//! (Anthropic Messages API, offline echo), the filesystem context retriever,
//! and the global configuration loader.

pub mod config;
pub mod context;
pub mod llm;
