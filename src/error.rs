//! Error types for newsletter-digest.

use std::time::Duration;

/// Top-level error type for the digest tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail source (Gmail API) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Gmail API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Message {id} has no raw content")]
    MissingContent { id: String },

    #[error("Failed to decode message {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Invalid response from Gmail: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for MailError {
    fn from(error: reqwest::Error) -> Self {
        MailError::Http(error.to_string())
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} upstream error ({status}): {reason}")]
    Upstream {
        provider: String,
        status: u16,
        reason: String,
    },

    #[error("Network error talking to {provider}: {reason}")]
    Network { provider: String, reason: String },

    #[error("Provider {provider} rejected the request ({status}): {reason}")]
    InvalidRequest {
        provider: String,
        status: u16,
        reason: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether the failure is expected to clear up with time.
    ///
    /// Rate limits, 5xx/overloaded responses and connection-level failures
    /// are transient. Everything else is surfaced to the caller as-is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Upstream { .. } | LlmError::Network { .. }
        )
    }
}

/// Summarization controller errors.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Summarization failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("Summarization failed: {0}")]
    Backend(#[source] LlmError),
}

impl SummaryError {
    /// The backend error that ended the attempt loop.
    pub fn backend_error(&self) -> &LlmError {
        match self {
            SummaryError::RetriesExhausted { source, .. } => source,
            SummaryError::Backend(source) => source,
        }
    }
}

/// Output log / formatter errors.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record on line {line} of {path}: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Job orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to list messages: {0}")]
    Listing(#[source] MailError),

    #[error("Failed to prepare label '{name}': {source}")]
    Label {
        name: String,
        #[source]
        source: MailError,
    },

    #[error("Job aborted at message {message_id} after {flushed} result(s) were flushed: {source}")]
    Aborted {
        message_id: String,
        flushed: usize,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "Job aborted at message {message_id}: {source}; flushing {pending} result(s) also failed: {flush_error}"
    )]
    AbortedUnflushed {
        message_id: String,
        pending: usize,
        flush_error: OutputError,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to flush {count} result(s): {source}")]
    Flush {
        count: usize,
        #[source]
        source: OutputError,
    },
}

/// Result type alias for the digest tool.
pub type Result<T> = std::result::Result<T, Error>;
