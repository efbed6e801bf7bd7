//! Context retrieval adapters.
//!
//! Implements the `ContextRetriever` port from `pipeloom-core` over plain
//! files on disk.

pub mod fs;

pub use fs::FsContextRetriever;
