//! Newsletter summarization.
//!
//! `Summarizer` owns the retry loop around a single LLM call and the
//! tolerant parsing of whatever the model returns.

mod controller;
mod model;
mod prompt;

pub use controller::{Summarizer, SummarizerConfig, UsageSnapshot};
pub use model::{ModelSummary, NO_SUBJECT, SummaryRequest, SummaryResult, now_iso};
pub use prompt::{build_prompt, parse_model_output, summary_schema};
