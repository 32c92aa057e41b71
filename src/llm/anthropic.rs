//! Anthropic Messages API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use super::costs;
use super::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, error_for_status,
    error_for_transport, retry_after,
};
use crate::error::LlmError;

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Calls `POST {base}/messages` with an `x-api-key` header.
pub struct AnthropicProvider {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
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

    /// `response_schema` is not sent; config refuses to enable it for this backend.
    fn build_body(&self, request: &CompletionRequest) -> Value {
        // System messages go in the top-level `system` field.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), "Anthropic request");

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
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

fn parse_response(json: &Value) -> Result<CompletionResponse, LlmError> {
    let texts: Vec<&str> = json
        .get("content")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();

    if texts.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "No text content in response".to_string(),
        });
    }

    let tokens = |key: &str| {
        json.pointer(&format!("/usage/{key}"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    };

    let finish_reason = match json.get("stop_reason").and_then(|s| s.as_str()) {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Unknown,
    };

    Ok(CompletionResponse {
        content: texts.join(""),
        input_tokens: tokens("input_tokens"),
        output_tokens: tokens("output_tokens"),
        finish_reason,
        response_id: json.get("id").and_then(|v| v.as_str()).map(String::from),
    })
}
