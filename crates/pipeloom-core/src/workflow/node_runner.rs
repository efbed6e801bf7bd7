//! Default node executor: dispatches on node type.
//!
//! - `input` returns the run input (or its configured default)
//! - `context` queries a `ContextRetriever`
//! - `generation`, `ensemble`, `validation` call an `LlmProvider`
//! - `output` combines its predecessors' outputs

use std::sync::Arc;

use futures_util::StreamExt;
use pipeloom_types::config::LlmSettings;
use pipeloom_types::error::NodeError;
use pipeloom_types::llm::{CompletionRequest, Message, MessageRole, StreamEvent};
use pipeloom_types::workflow::{ContextConfig, LlmNodeConfig, NodeConfig, OutputCombine};
use tracing::{Instrument, info_span};

use crate::llm::provider::LlmProvider;

use super::executor::{NodeEvent, NodeExecutor, NodeStream};
use super::graph::Node;
use super::retriever::ContextRetriever;

/// Separator between predecessor outputs in prompts and combined output.
const INPUT_SEPARATOR: &str = "\n\n";

/// Executes workflow nodes against an LLM provider and a context retriever.
pub struct NodeRunner<P, R> {
    provider: Arc<P>,
    retriever: Arc<R>,
    llm: LlmSettings,
}

impl<P: LlmProvider + 'static, R: ContextRetriever + 'static> NodeRunner<P, R> {
    pub fn new(provider: Arc<P>, retriever: Arc<R>, llm: LlmSettings) -> Self {
        Self {
            provider,
            retriever,
            llm,
        }
    }

    /// Build the completion request for an LLM-backed node.
    fn build_request(&self, config: &LlmNodeConfig, inputs: &[String], stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: config.model.clone().unwrap_or_else(|| self.llm.model.clone()),
            messages: vec![Message {
                role: MessageRole::User,
                content: inputs.join(INPUT_SEPARATOR),
            }],
            system: config.prompt.clone().filter(|p| !p.trim().is_empty()),
            max_tokens: config.max_tokens.unwrap_or(self.llm.max_tokens),
            temperature: config.temperature.or(self.llm.temperature),
            stream,
        }
    }

    async fn retrieve(&self, config: &ContextConfig, inputs: &[String]) -> Result<String, NodeError> {
        let query = inputs.join(INPUT_SEPARATOR);
        self.retriever
            .retrieve(&config.knowledge_base, &query, config.max_chars)
            .await
            .map_err(|e| NodeError::Retrieval(e.to_string()))
    }
}

fn input_value(default_value: Option<&str>, inputs: &[String]) -> String {
    let run_input = inputs.first().map(String::as_str).unwrap_or_default();
    match default_value {
        Some(default) if run_input.trim().is_empty() => default.to_string(),
        _ => run_input.to_string(),
    }
}

fn combine(policy: OutputCombine, inputs: Vec<String>) -> String {
    match policy {
        OutputCombine::Concatenate => inputs.join(INPUT_SEPARATOR),
        OutputCombine::Last => inputs.into_iter().last().unwrap_or_default(),
    }
}

impl<P: LlmProvider + 'static, R: ContextRetriever + 'static> NodeExecutor for NodeRunner<P, R> {
    async fn execute(&self, node: &Node, inputs: Vec<String>) -> Result<String, NodeError> {
        match &node.config {
            NodeConfig::Input(cfg) => Ok(input_value(cfg.default_value.as_deref(), &inputs)),
            NodeConfig::Context(cfg) => self.retrieve(cfg, &inputs).await,
            NodeConfig::Output(cfg) => Ok(combine(cfg.combine, inputs)),
            NodeConfig::Generation(cfg) | NodeConfig::Ensemble(cfg) | NodeConfig::Validation(cfg) => {
                let request = self.build_request(cfg, &inputs, false);
                let span = info_span!(
                    "gen_ai.complete",
                    node_id = node.id.as_str(),
                    gen_ai.system = self.provider.name(),
                    gen_ai.request.model = %request.model,
                    gen_ai.request.max_tokens = request.max_tokens,
                );
                self.provider
                    .complete(&request)
                    .instrument(span)
                    .await
                    .map(|response| response.content)
                    .map_err(|e| NodeError::Llm(e.to_string()))
            }
        }
    }

    /// LLM-backed nodes stream text deltas as fragments; every other node
    /// reports only its final output.
    fn execute_streaming<'a>(&'a self, node: &'a Node, inputs: Vec<String>) -> NodeStream<'a> {
        let config = match &node.config {
            NodeConfig::Generation(cfg) | NodeConfig::Ensemble(cfg) | NodeConfig::Validation(cfg) => cfg,
            _ => {
                return Box::pin(async_stream::stream! {
                    match self.execute(node, inputs).await {
                        Ok(output) => yield NodeEvent::Succeeded(output),
                        Err(error) => yield NodeEvent::Failed(error),
                    }
                });
            }
        };

        let request = self.build_request(config, &inputs, true);
        let span = info_span!(
            "gen_ai.stream",
            node_id = node.id.as_str(),
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
        );
        let mut events = self.provider.stream(request);

        Box::pin(async_stream::stream! {
            let mut output = String::new();
            while let Some(event) = events.next().instrument(span.clone()).await {
                match event {
                    Ok(StreamEvent::TextDelta { text }) => {
                        output.push_str(&text);
                        yield NodeEvent::Fragment(text);
                    }
                    Ok(StreamEvent::Done) => break,
                    Ok(_) => {}
                    Err(e) => {
                        span.in_scope(|| tracing::warn!(error = %e, "llm stream failed"));
                        yield NodeEvent::Failed(NodeError::Llm(e.to_string()));
                        return;
                    }
                }
            }
            yield NodeEvent::Succeeded(output);
        })
    }
}
