//! Summarization controller: prompt, bounded retry, tolerant parsing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use super::model::{SummaryRequest, SummaryResult};
use super::prompt::{build_prompt, parse_model_output, summary_schema};
use crate::error::SummaryError;
use crate::llm::retry::{
    JitterSource, RetryFailure, RetryPolicy, Sleeper, TokioSleeper, UniformJitter,
    retry_transient,
};
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider, cost_of};

/// Tunables for the summarizer.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub retry: RetryPolicy,
    /// Ask the backend to enforce the summary JSON schema.
    pub structured_output: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            structured_output: false,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Token usage accumulated across all calls made by one summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsageSnapshot {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Decimal,
}

#[derive(Debug, Default)]
struct UsageCounters {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// Turns one newsletter into a `SummaryResult`.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    config: SummarizerConfig,
    usage: UsageCounters,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SummarizerConfig) -> Self {
        Self {
            llm,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(UniformJitter),
            config,
            usage: UsageCounters::default(),
        }
    }

    /// Replace the clock used for backoff waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the jitter source.
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Summarize one message.
    ///
    /// Transient backend errors are retried per the configured policy; any
    /// other backend error is returned after a single call. Output that is
    /// not a JSON object yields a fallback result rather than an error.
    pub async fn summarize(
        &self,
        subject: &str,
        body: &str,
        date_iso: &str,
    ) -> Result<SummaryResult, SummaryError> {
        let request = SummaryRequest::new(subject, body, date_iso);
        self.summarize_request(&request).await
    }

    pub async fn summarize_request(
        &self,
        request: &SummaryRequest,
    ) -> Result<SummaryResult, SummaryError> {
        let prompt = build_prompt(request.subject(), request.timestamp(), request.body());
        let mut completion = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        if let Some(t) = self.config.temperature {
            completion = completion.with_temperature(t);
        }
        if let Some(max) = self.config.max_tokens {
            completion = completion.with_max_tokens(max);
        }
        if self.config.structured_output {
            completion = completion.with_response_schema(summary_schema());
        }

        let outcome = retry_transient(
            &self.config.retry,
            self.sleeper.as_ref(),
            self.jitter.as_ref(),
            |_attempt| {
                self.usage.calls.fetch_add(1, Ordering::Relaxed);
                self.llm.complete(completion.clone())
            },
        )
        .await;

        let (response, attempts) = match outcome {
            Ok(done) => done,
            Err(RetryFailure::Exhausted {
                attempts,
                last_error,
            }) => {
                error!(subject = %request.subject(), attempts, error = %last_error, "Retries exhausted");
                return Err(SummaryError::RetriesExhausted {
                    attempts,
                    source: last_error,
                });
            }
            Err(RetryFailure::Fatal { attempt, error }) => {
                error!(subject = %request.subject(), attempt = attempt + 1, error = %error, "LLM call failed");
                return Err(SummaryError::Backend(error));
            }
        };

        self.usage
            .input_tokens
            .fetch_add(u64::from(response.input_tokens), Ordering::Relaxed);
        self.usage
            .output_tokens
            .fetch_add(u64::from(response.output_tokens), Ordering::Relaxed);

        if response.finish_reason == FinishReason::Length {
            warn!(subject = %request.subject(), "Model output was truncated");
        }
        debug!(
            subject = %request.subject(),
            attempts,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Summary received"
        );

        Ok(match parse_model_output(&response.content) {
            Some(output) => SummaryResult::from_model(request, output),
            None => {
                warn!(subject = %request.subject(), "Model output was not a JSON object, storing raw text");
                SummaryResult::fallback(request, &response.content)
            }
        })
    }

    /// Usage so far, priced with the backend's per-token rates.
    pub fn usage(&self) -> UsageSnapshot {
        let input_tokens = self.usage.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.usage.output_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            calls: self.usage.calls.load(Ordering::Relaxed),
            input_tokens,
            output_tokens,
            cost: cost_of(self.llm.cost_per_token(), input_tokens, output_tokens),
        }
    }
}
