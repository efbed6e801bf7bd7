//! ContextRetriever port used by `context` nodes.

use std::future::Future;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("knowledge base '{0}' not found")]
    KnowledgeBaseNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("retrieval failed: {0}")]
    Other(String),
}

/// Retrieves text relevant to a query from a named knowledge base.
///
/// Implementations live in pipeloom-infra (`FsContextRetriever`).
pub trait ContextRetriever: Send + Sync {
    /// Return at most `max_chars` characters relevant to `query`.
    ///
    /// An empty query means "no filter"; the retriever returns its
    /// best general content.
    fn retrieve(
        &self,
        knowledge_base: &str,
        query: &str,
        max_chars: Option<usize>,
    ) -> impl Future<Output = Result<String, RetrieverError>> + Send;
}
