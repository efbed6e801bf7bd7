//! LLM provider implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `pipeloom-core`: Anthropic Claude and an offline echo provider.
//!
//! [`create_provider`] constructs the right provider from [`LlmSettings`].
//!
//! [`LlmProvider`]: pipeloom_core::llm::provider::LlmProvider

pub mod anthropic;
pub mod echo;

use secrecy::SecretString;

use pipeloom_core::llm::box_provider::BoxLlmProvider;
use pipeloom_types::config::LlmSettings;
use pipeloom_types::llm::{LlmError, ProviderType};

use self::anthropic::AnthropicProvider;
use self::echo::EchoProvider;

/// Read the API key named by `settings.api_key_env` from the environment.
///
/// Empty values are treated as missing.
pub fn api_key_from_env(settings: &LlmSettings) -> Option<String> {
    std::env::var(&settings.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

/// Create a [`BoxLlmProvider`] from [`LlmSettings`] and an already-resolved key.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] if the provider needs an API
/// key and none is given.
pub fn create_provider(
    settings: &LlmSettings,
    api_key: Option<&str>,
) -> Result<BoxLlmProvider, LlmError> {
    match settings.provider {
        ProviderType::Anthropic => {
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            let secret = SecretString::from(key.to_string());
            let mut provider = AnthropicProvider::new(secret, settings.model.clone())?;
            if let Some(base_url) = settings.base_url.as_deref() {
                provider = provider.with_base_url(base_url);
            }
            tracing::debug!(provider = "anthropic", model = %settings.model, "LLM provider created");
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::Echo => {
            tracing::debug!(provider = "echo", model = %settings.model, "LLM provider created");
            Ok(BoxLlmProvider::new(EchoProvider::new(settings.model.clone())))
        }
    }
}

/// [`create_provider`] with the key taken from the environment.
pub fn create_provider_from_env(settings: &LlmSettings) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key_from_env(settings);
    if key.is_none() && settings.provider == ProviderType::Anthropic {
        tracing::warn!(env = %settings.api_key_env, "API key environment variable is not set");
    }
    create_provider(settings, key.as_deref())
}
