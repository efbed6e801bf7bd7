//! BoxLlmProvider: dynamic dispatch wrapper for LlmProvider.
//!
//! 1. `LlmProviderDyn` is an object-safe mirror with boxed futures
//! 2. blanket impl of `LlmProviderDyn` for all `T: LlmProvider`
//! 3. `BoxLlmProvider` wraps `Box<dyn LlmProviderDyn>` and itself implements
//!    `LlmProvider`, so it can be plugged in wherever a provider is generic

use std::future::Future;
use std::pin::Pin;

use pipeloom_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};

use super::provider::{LlmEventStream, LlmProvider};

/// Object-safe version of [`LlmProvider`].
pub trait LlmProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &ProviderCapabilities;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;

    fn stream_boxed(&self, request: CompletionRequest) -> LlmEventStream;
}

impl<T: LlmProvider> LlmProviderDyn for T {
    fn name(&self) -> &str {
        LlmProvider::name(self)
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        LlmProvider::capabilities(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }

    fn stream_boxed(&self, request: CompletionRequest) -> LlmEventStream {
        self.stream(request)
    }
}

/// Type-erased LLM provider selected at runtime from configuration.
pub struct BoxLlmProvider {
    inner: Box<dyn LlmProviderDyn + Send + Sync>,
}

impl BoxLlmProvider {
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }
}

impl std::fmt::Debug for BoxLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmProvider")
            .field("name", &self.inner.name())
            .finish()
    }
}

impl LlmProvider for BoxLlmProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        self.inner.capabilities()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }

    fn stream(&self, request: CompletionRequest) -> LlmEventStream {
        self.inner.stream_boxed(request)
    }
}
