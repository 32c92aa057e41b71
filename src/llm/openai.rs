//! OpenAI Responses API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use super::costs;
use super::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, error_for_status,
    error_for_transport, retry_after,
};
use crate::error::LlmError;

const PROVIDER: &str = "openai";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-request timeout. No timeout wraps a whole run, only individual calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Calls `POST {base}/responses` with bearer auth.
pub struct OpenAiProvider {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, model: &str, base_url: &str) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let input: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "input": input,
        });

        if let Some(max) = request.max_tokens {
            body["max_output_tokens"] = json!(max);
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(schema) = &request.response_schema {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": schema.name,
                    "strict": schema.strict,
                    "schema": schema.schema,
                }
            });
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), "OpenAI request");

        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| error_for_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(error_for_status(PROVIDER, status, wait, text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| error_for_transport(PROVIDER, e))?;

        parse_response(&json)
    }
}

/// Pull the output text, usage and finish reason out of a Responses payload.
fn parse_response(json: &Value) -> Result<CompletionResponse, LlmError> {
    let content = json
        .get("output_text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            let collected: Vec<&str> = json
                .get("output")
                .and_then(|o| o.as_array())
                .into_iter()
                .flatten()
                .filter_map(|item| item.get("content").and_then(|c| c.as_array()))
                .flatten()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if collected.is_empty() {
                None
            } else {
                Some(collected.join("\n"))
            }
        })
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "No text in response".to_string(),
        })?;

    let usage = json.get("usage");
    let tokens = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    };

    let finish_reason = match json.get("status").and_then(|s| s.as_str()) {
        Some("completed") => FinishReason::Stop,
        Some("incomplete") => {
            let reason = json
                .pointer("/incomplete_details/reason")
                .and_then(|r| r.as_str());
            match reason {
                Some("max_output_tokens") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Unknown,
            }
        }
        _ => FinishReason::Unknown,
    };

    Ok(CompletionResponse {
        content,
        input_tokens: tokens("input_tokens"),
        output_tokens: tokens("output_tokens"),
        finish_reason,
        response_id: json.get("id").and_then(|v| v.as_str()).map(String::from),
    })
}
