//! SSE stream for the Anthropic Messages API.
//!
//! Event sequence:
//! 1. `message_start` with initial usage
//! 2. per block: `content_block_start`, N x `content_block_delta`, `content_block_stop`
//! 3. `message_delta` with stop_reason and cumulative usage
//! 4. `message_stop`
//!
//! `ping` keepalives may appear anywhere and `error` events may appear
//! mid-stream. Only text deltas are surfaced; other block types are skipped.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use secrecy::{ExposeSecret, SecretString};

use pipeloom_core::llm::provider::LlmEventStream;
use pipeloom_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::types::{
    AnthropicDelta, AnthropicRequest, ContentBlockDeltaPayload, ErrorPayload, MessageDeltaPayload,
    MessageStartPayload,
};

/// Map an HTTP status (and body) from the Messages API to an [`LlmError`].
pub(crate) fn status_error(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorPayload>(&body)
        .map(|p| p.error.message)
        .unwrap_or(body);
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: None,
        },
        400 => LlmError::InvalidRequest(message),
        529 => LlmError::Overloaded(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

/// Parse a stop reason string, defaulting to `EndTurn` for unknown values.
pub(crate) fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    raw.and_then(|s| s.parse().ok()).unwrap_or(StopReason::EndTurn)
}

/// Translate one SSE event into zero or more [`StreamEvent`]s.
fn process_event(event_type: &str, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let mut events = Vec::new();

    match event_type {
        "message_start" => {
            let payload: MessageStartPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("message_start: {e}")))?;
            tracing::debug!(message_id = %payload.message.id, model = %payload.message.model, "anthropic stream started");
            if let Some(usage) = payload.message.usage {
                events.push(StreamEvent::Usage(Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                }));
            }
        }

        "content_block_delta" => {
            let payload: ContentBlockDeltaPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("content_block_delta: {e}")))?;
            if let AnthropicDelta::TextDelta { text } = payload.delta {
                events.push(StreamEvent::TextDelta { text });
            }
        }

        "message_delta" => {
            let payload: MessageDeltaPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("message_delta: {e}")))?;
            events.push(StreamEvent::Usage(Usage {
                input_tokens: payload.usage.input_tokens,
                output_tokens: payload.usage.output_tokens,
            }));
            events.push(StreamEvent::MessageDelta {
                stop_reason: parse_stop_reason(payload.delta.stop_reason.as_deref()),
            });
        }

        "message_stop" => events.push(StreamEvent::Done),

        "content_block_start" | "content_block_stop" | "ping" => {}

        "error" => {
            let payload: ErrorPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("error event: {e}")))?;
            return Err(match payload.error.error_type.as_str() {
                "overloaded_error" => LlmError::Overloaded(payload.error.message),
                "rate_limit_error" => LlmError::RateLimited {
                    retry_after_ms: None,
                },
                "authentication_error" => LlmError::AuthenticationFailed,
                "invalid_request_error" => LlmError::InvalidRequest(payload.error.message),
                _ => LlmError::Provider {
                    message: payload.error.message,
                },
            });
        }

        unknown => {
            tracing::warn!(event_type = unknown, "unknown Anthropic event type, skipping");
        }
    }

    Ok(events)
}

/// Open a streaming SSE connection to the Messages API.
///
/// The connection is closed after `message_stop` or the first error so the
/// event source never reconnects on its own.
pub fn create_anthropic_stream(
    client: &reqwest::Client,
    url: &str,
    body: AnthropicRequest,
    api_key: &SecretString,
    api_version: &'static str,
) -> LlmEventStream {
    let builder = client
        .post(url)
        .header("x-api-key", api_key.expose_secret())
        .header("anthropic-version", api_version)
        .header("content-type", "application/json")
        .json(&body);

    Box::pin(async_stream::try_stream! {
        let mut source: EventSource = builder
            .eventsource()
            .map_err(|e| LlmError::Provider { message: format!("cannot open event source: {e}") })?;

        while let Some(item) = source.next().await {
            match item {
                Ok(Event::Open) => yield StreamEvent::Connected,
                Ok(Event::Message(message)) => {
                    let events = process_event(&message.event, &message.data);
                    if events.is_err() {
                        source.close();
                    }
                    let events = events?;
                    let done = events.iter().any(|e| matches!(e, StreamEvent::Done));
                    for event in events {
                        yield event;
                    }
                    if done {
                        source.close();
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    source.close();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(status = %status, "Anthropic stream API error response");
                    Err::<(), _>(status_error(status.as_u16(), body))?;
                }
                Err(e) => {
                    source.close();
                    Err::<(), _>(LlmError::Stream(e.to_string()))?;
                }
            }
        }
    })
}
