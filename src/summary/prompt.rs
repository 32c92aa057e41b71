//! Prompt text and response schema for newsletter summaries.

use serde_json::json;

use super::model::ModelSummary;
use crate::llm::ResponseSchema;

/// Build the summarization prompt for one newsletter.
pub fn build_prompt(subject: &str, date_iso: &str, body: &str) -> String {
    format!(
        r#"You summarize newsletters for a busy researcher.
- Write a faithful, neutral 4–5 sentence summary.
- Then produce 3–7 short 'highlights' bullets (most important points).
- Never invent links or facts. If uncertain, omit.

Return valid JSON:
{{
  "subject": "...",
  "date_iso": "...",
  "summary_4to5_sentences": "...",
  "highlights": ["point 1", "point 2", "..."]
}}

Now summarize:
Subject: {subject}
Date: {date_iso}
Content:
{body}"#
    )
    .trim()
    .to_string()
}

/// Strict JSON schema for structured-output mode.
pub fn summary_schema() -> ResponseSchema {
    ResponseSchema {
        name: "newsletter_summary".to_string(),
        strict: true,
        schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "subject": {"type": "string"},
                "date_iso": {"type": "string"},
                "summary_4to5_sentences": {
                    "type": "string",
                    "description": "A concise 4-5 sentence summary of the newsletter content."
                },
                "highlights": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 3,
                    "maxItems": 7,
                    "description": "Most important highlights as short bullets."
                }
            },
            "required": ["subject", "date_iso", "summary_4to5_sentences", "highlights"]
        }),
    }
}

/// Parse model output into a `ModelSummary`.
///
/// Returns `None` when the text holds no JSON object; the caller decides the
/// fallback.
pub fn parse_model_output(raw: &str) -> Option<ModelSummary> {
    let json_str = extract_json_object(raw);
    let value: serde_json::Value = serde_json::from_str(&json_str).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Extract a JSON object from text that may be wrapped in a markdown fence.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    trimmed.to_string()
}
