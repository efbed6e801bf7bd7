//! Global configuration types for pipeloom.
//!
//! `GlobalConfig` represents the top-level `pipeloom.toml` in the data
//! directory. Every section and field has a default, so an empty file (or no
//! file) yields a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::ProviderType;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound on a single wait for node events, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the node -> coordinator and coordinator -> consumer channels.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// How long cancelled nodes get to wind down before being aborted.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// How long a stopped run waits for active nodes before cancelling them.
    /// `0` (or an explicit `None` from code) waits indefinitely.
    #[serde(default = "default_stop_drain_timeout_secs")]
    pub stop_drain_timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_event_buffer() -> usize {
    256
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

fn default_stop_drain_timeout_secs() -> Option<u64> {
    Some(300)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            event_buffer: default_event_buffer(),
            cancel_grace_ms: default_cancel_grace_ms(),
            stop_drain_timeout_secs: default_stop_drain_timeout_secs(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn stop_drain_timeout(&self) -> Option<Duration> {
        self.stop_drain_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// LLM provider selection and request defaults for LLM-backed nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: ProviderType,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Name of the environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

/// Knowledge-base location for `context` nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Directory holding one sub-directory per knowledge base.
    /// Relative paths are resolved against the data directory.
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: PathBuf,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_knowledge_dir() -> PathBuf {
    PathBuf::from("knowledge")
}

fn default_max_chars() -> usize {
    8_000
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            knowledge_dir: default_knowledge_dir(),
            max_chars: default_max_chars(),
        }
    }
}

/// HTTP server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
