//! LlmProvider trait definition.
//!
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use pipeloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StreamEvent,
};

/// Boxed, `'static` stream of provider events.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM provider backends.
///
/// Implementations live in pipeloom-infra (`AnthropicProvider`, `EchoProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    fn stream(&self, request: CompletionRequest) -> LlmEventStream;
}
