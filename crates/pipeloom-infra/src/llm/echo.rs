//! EchoProvider: offline, deterministic [`LlmProvider`].
//!
//! Replies with the system prompt (when present) followed by the last user
//! message. Streaming yields one `TextDelta` per whitespace-separated word,
//! so the concatenated deltas equal the non-streaming content.

use std::sync::atomic::{AtomicU64, Ordering};

use pipeloom_core::llm::provider::{LlmEventStream, LlmProvider};
use pipeloom_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, ProviderCapabilities,
    StopReason, StreamEvent, Usage,
};

/// Default model name reported when a request leaves `model` empty.
pub const ECHO_MODEL: &str = "echo";

#[derive(Debug)]
pub struct EchoProvider {
    model: String,
    capabilities: ProviderCapabilities,
    counter: AtomicU64,
}

impl EchoProvider {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            model: if model.is_empty() {
                ECHO_MODEL.to_string()
            } else {
                model
            },
            capabilities: ProviderCapabilities {
                streaming: true,
                max_context_tokens: u32::MAX,
                max_output_tokens: u32::MAX,
            },
            counter: AtomicU64::new(0),
        }
    }

    fn reply(request: &CompletionRequest) -> String {
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        match request.system.as_deref().filter(|s| !s.is_empty()) {
            Some(system) if user.is_empty() => system.to_string(),
            Some(system) => format!("{system}\n\n{user}"),
            None => user.to_string(),
        }
    }

    /// Split into word-sized chunks that keep their trailing whitespace.
    fn chunks(text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut in_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                in_space = true;
            } else if in_space {
                chunks.push(std::mem::take(&mut current));
                in_space = false;
            }
            current.push(c);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn usage(request: &CompletionRequest, reply: &str) -> Usage {
        let input = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum::<usize>();
        Usage {
            input_tokens: u32::try_from(input).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(reply.split_whitespace().count()).unwrap_or(u32::MAX),
        }
    }

    fn model_for(&self, request: &CompletionRequest) -> String {
        if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new(ECHO_MODEL)
    }
}

impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = Self::reply(request);
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(CompletionResponse {
            id: format!("echo-{n}"),
            usage: Self::usage(request, &content),
            model: self.model_for(request),
            stop_reason: StopReason::EndTurn,
            content,
        })
    }

    fn stream(&self, request: CompletionRequest) -> LlmEventStream {
        let reply = Self::reply(&request);
        let usage = Self::usage(&request, &reply);
        let chunks = Self::chunks(&reply);

        Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Connected);
            for text in chunks {
                yield Ok(StreamEvent::TextDelta { text });
            }
            yield Ok(StreamEvent::Usage(usage));
            yield Ok(StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn });
            yield Ok(StreamEvent::Done);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pipeloom_types::llm::Message;

    fn request(system: Option<&str>, user: &str) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages: vec![Message {
                role: MessageRole::User,
                content: user.to_string(),
            }],
            system: system.map(str::to_string),
            max_tokens: 64,
            temperature: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn complete_echoes_system_and_user() {
        let provider = EchoProvider::default();
        let response = provider
            .complete(&request(Some("Summarize:"), "the quick fox"))
            .await
            .unwrap();
        assert_eq!(response.content, "Summarize:\n\nthe quick fox");
        assert_eq!(response.model, "echo");
        assert_eq!(response.usage.input_tokens, 3);
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn complete_without_system_is_identity() {
        let provider = EchoProvider::new("echo-2");
        let response = provider.complete(&request(None, "hello")).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.model, "echo-2");
    }

    #[tokio::test]
    async fn stream_deltas_concatenate_to_complete_content() {
        let provider = EchoProvider::default();
        let req = request(Some("Be brief."), "one  two\nthree");
        let expected = provider.complete(&req).await.unwrap().content;

        let events: Vec<_> = provider.stream(req).collect().await;
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::TextDelta { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, expected);
        assert!(matches!(events.first(), Some(Ok(StreamEvent::Connected))));
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Done))));
    }

    #[test]
    fn chunks_keep_whitespace() {
        assert_eq!(EchoProvider::chunks("a b  c"), vec!["a ", "b  ", "c"]);
        assert!(EchoProvider::chunks("").is_empty());
    }
}
