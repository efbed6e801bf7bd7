//! Node executor contract.
//!
//! The engine knows nothing about what a node does. It hands each ready node
//! and its predecessors' outputs to a `NodeExecutor` and consumes the
//! resulting stream of `NodeEvent`s.

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use pipeloom_types::error::NodeError;

use super::graph::Node;

/// Progress reported by a running node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Partial output; forwarded to subscribers as a `stream` event.
    Fragment(String),
    /// Terminal success carrying the node's full output.
    Succeeded(String),
    /// Terminal failure.
    Failed(NodeError),
}

impl NodeEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeEvent::Fragment(_))
    }
}

/// Stream of events for one node execution, ending in a terminal event.
pub type NodeStream<'a> = Pin<Box<dyn Stream<Item = NodeEvent> + Send + 'a>>;

/// Performs the work of a single node.
///
/// Uses RPITIT for `execute`, consistent with `LlmProvider`. Implementors
/// that can produce partial output override `execute_streaming`.
pub trait NodeExecutor: Send + Sync + 'static {
    /// Run `node` against its predecessors' outputs (in predecessor order).
    fn execute(
        &self,
        node: &Node,
        inputs: Vec<String>,
    ) -> impl Future<Output = Result<String, NodeError>> + Send;

    /// Streaming form used by the engine.
    ///
    /// The default emits the whole output as one fragment followed by
    /// `Succeeded`, or a single `Failed`.
    fn execute_streaming<'a>(&'a self, node: &'a Node, inputs: Vec<String>) -> NodeStream<'a> {
        Box::pin(async_stream::stream! {
            match self.execute(node, inputs).await {
                Ok(output) => {
                    yield NodeEvent::Fragment(output.clone());
                    yield NodeEvent::Succeeded(output);
                }
                Err(error) => yield NodeEvent::Failed(error),
            }
        })
    }
}
