//! Configuration types, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::retry::RetryPolicy;
use crate::llm::{LlmBackend, LlmConfig, anthropic, openai};
use crate::mail::GoogleAuthConfig;
use crate::mail::gmail::DEFAULT_GMAIL_ENDPOINT;
use crate::summary::SummarizerConfig;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Gmail connection settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub token_path: PathBuf,
    pub auth: GoogleAuthConfig,
}

/// Everything a digest run needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub gmail: GmailConfig,
    pub summarizer: SummarizerConfig,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>()?,
            None => LlmBackend::OpenAi,
        };

        let (key_var, model_var, url_var, default_model, default_url) = match backend {
            LlmBackend::OpenAi => (
                "OPENAI_API_KEY",
                "OPENAI_MODEL",
                "OPENAI_BASE_URL",
                DEFAULT_OPENAI_MODEL,
                openai::DEFAULT_BASE_URL,
            ),
            LlmBackend::Anthropic => (
                "ANTHROPIC_API_KEY",
                "ANTHROPIC_MODEL",
                "ANTHROPIC_BASE_URL",
                DEFAULT_ANTHROPIC_MODEL,
                anthropic::DEFAULT_BASE_URL,
            ),
        };

        let api_key = get(key_var).ok_or_else(|| ConfigError::MissingRequired {
            key: key_var.to_string(),
            hint: format!("export {key_var}=... (or add it to .env)"),
        })?;

        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: get(model_var).unwrap_or_else(|| default_model.to_string()),
            base_url: get(url_var).unwrap_or_else(|| default_url.to_string()),
        };

        let token_path = PathBuf::from(
            get("GMAIL_TOKEN_PATH").unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string()),
        );
        let auth = GoogleAuthConfig::from_lookup(&lookup).with_token_file(&token_path)?;
        let gmail = GmailConfig {
            api_base: get("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_GMAIL_ENDPOINT.to_string()),
            token_path,
            auth,
        };

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = parse_or(
            "DIGEST_MAX_ATTEMPTS",
            get("DIGEST_MAX_ATTEMPTS"),
            defaults.max_attempts,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DIGEST_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let cap_secs: u64 = parse_or(
            "DIGEST_BACKOFF_CAP_SECS",
            get("DIGEST_BACKOFF_CAP_SECS"),
            defaults.max_delay.as_secs(),
        )?;

        let structured_output =
            parse_bool("DIGEST_STRUCTURED_OUTPUT", get("DIGEST_STRUCTURED_OUTPUT"))?;
        if structured_output && llm.backend == LlmBackend::Anthropic {
            return Err(ConfigError::InvalidValue {
                key: "DIGEST_STRUCTURED_OUTPUT".to_string(),
                message: "schema-constrained output is only supported by the openai backend"
                    .to_string(),
            });
        }

        let summarizer = SummarizerConfig {
            retry: RetryPolicy {
                max_attempts,
                max_delay: Duration::from_secs(cap_secs),
                ..defaults
            },
            structured_output,
            ..SummarizerConfig::default()
        };

        Ok(Self {
            llm,
            gmail,
            summarizer,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{v}' is not a boolean"),
            }),
        },
    }
}
