//! Newsletter Digest: Gmail newsletters summarized into a JSONL log.

pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod mail;
pub mod output;
pub mod summary;
