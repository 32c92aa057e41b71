//! LLM integration for newsletter-digest.
//!
//! Supports:
//! - **OpenAI**: Responses API over reqwest
//! - **Anthropic**: Messages API over reqwest
//!
//! Both implement the `LlmProvider` trait. Retry/backoff lives in `retry`
//! and is applied by the summarization controller, not by the providers.

pub mod anthropic;
mod costs;
pub mod openai;
pub mod provider;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use costs::{cost_of, model_cost};
pub use openai::OpenAiProvider;
pub use provider::*;

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmBackend::OpenAi),
            "anthropic" => Ok(LlmBackend::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected openai or anthropic)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let provider =
                AnthropicProvider::new(config.api_key.clone(), &config.model, &config.base_url)?;
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(provider))
        }
        LlmBackend::OpenAi => {
            let provider =
                OpenAiProvider::new(config.api_key.clone(), &config.model, &config.base_url)?;
            tracing::info!("Using OpenAI (model: {})", config.model);
            Ok(Arc::new(provider))
        }
    }
}
