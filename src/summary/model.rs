//! Summary request/result types.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// Subject used when a message has none.
pub const NO_SUBJECT: &str = "(no subject)";

/// Current UTC time as an ISO-8601 string with a `Z` suffix.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Input to the summarization controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    subject: String,
    body: String,
    timestamp: String,
}

impl SummaryRequest {
    /// Build a request. Blank subject/timestamp are replaced so that every
    /// result derived from this request has both fields populated.
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        let timestamp = timestamp.into();
        Self {
            subject: if subject.trim().is_empty() {
                NO_SUBJECT.to_string()
            } else {
                subject
            },
            body: body.into(),
            timestamp: if timestamp.trim().is_empty() {
                now_iso()
            } else {
                timestamp
            },
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// One summarized message, as written to the output log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_iso: String,
    #[serde(
        rename = "summary_4to5_sentences",
        alias = "summary",
        default,
        deserialize_with = "null_as_default"
    )]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub highlights: Vec<String>,
}

impl SummaryResult {
    /// Degraded result used when the model output is not the expected JSON.
    pub fn fallback(request: &SummaryRequest, raw_text: &str) -> Self {
        Self {
            subject: request.subject().to_string(),
            date_iso: request.timestamp().to_string(),
            summary: raw_text.trim().to_string(),
            highlights: Vec::new(),
        }
    }

    /// Merge parsed model output with the request. Subject and date are
    /// taken from the model only when it supplied non-blank values.
    pub fn from_model(request: &SummaryRequest, output: ModelSummary) -> Self {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            subject: non_blank(output.subject).unwrap_or_else(|| request.subject().to_string()),
            date_iso: non_blank(output.date_iso)
                .unwrap_or_else(|| request.timestamp().to_string()),
            summary: output.summary.unwrap_or_default(),
            highlights: output.highlights.unwrap_or_default(),
        }
    }
}

/// The JSON object the model is asked to return. Every field is optional;
/// the model output is untrusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelSummary {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub date_iso: Option<String>,
    #[serde(default, rename = "summary_4to5_sentences", alias = "summary")]
    pub summary: Option<String>,
    #[serde(default)]
    pub highlights: Option<Vec<String>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fills_blank_subject_and_timestamp() {
        let req = SummaryRequest::new("  ", "body", "");
        assert_eq!(req.subject(), NO_SUBJECT);
        assert!(req.timestamp().ends_with('Z'));
        assert!(req.timestamp().contains('T'));
    }

    #[test]
    fn request_keeps_given_values() {
        let req = SummaryRequest::new("S", "B", "D");
        assert_eq!(req.subject(), "S");
        assert_eq!(req.body(), "B");
        assert_eq!(req.timestamp(), "D");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let result = SummaryResult {
            subject: "Weekly".into(),
            date_iso: "2026-01-05T08:00:00Z".into(),
            summary: "Things happened.".into(),
            highlights: vec!["one".into()],
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"subject":"Weekly","date_iso":"2026-01-05T08:00:00Z","summary_4to5_sentences":"Things happened.","highlights":["one"]}"#
        );
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let result = SummaryResult {
            subject: "Café ☕".into(),
            date_iso: "D".into(),
            summary: "—".into(),
            highlights: vec![],
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("Café ☕"));
    }

    #[test]
    fn deserializes_summary_alias_and_nulls() {
        let json = r#"{"subject": null, "date_iso": "D", "summary": "s", "highlights": null}"#;
        let result: SummaryResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.subject, "");
        assert_eq!(result.summary, "s");
        assert!(result.highlights.is_empty());
    }

    #[test]
    fn from_model_replaces_blank_fields() {
        let req = SummaryRequest::new("S", "B", "D");
        let output = ModelSummary {
            subject: Some("   ".into()),
            date_iso: None,
            summary: Some("x".into()),
            highlights: Some(vec!["a".into()]),
        };
        let result = SummaryResult::from_model(&req, output);
        assert_eq!(result.subject, "S");
        assert_eq!(result.date_iso, "D");
        assert_eq!(result.summary, "x");
        assert_eq!(result.highlights, vec!["a"]);
    }

    #[test]
    fn from_model_prefers_model_values_when_present() {
        let req = SummaryRequest::new("S", "B", "D");
        let output = ModelSummary {
            subject: Some("Model subject".into()),
            date_iso: Some("2026-02-01".into()),
            ..ModelSummary::default()
        };
        let result = SummaryResult::from_model(&req, output);
        assert_eq!(result.subject, "Model subject");
        assert_eq!(result.date_iso, "2026-02-01");
        assert!(result.highlights.is_empty());
    }

    #[test]
    fn fallback_trims_raw_text() {
        let req = SummaryRequest::new("S", "B", "D");
        let result = SummaryResult::fallback(&req, "  not json \n");
        assert_eq!(result.summary, "not json");
        assert!(result.highlights.is_empty());
    }
}
