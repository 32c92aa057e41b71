//! Digest jobs: list messages, summarize each, tag them, append the log.
//!
//! Flow per run:
//! 1. List message handles (label snapshot or search query)
//! 2. Resolve the label to apply, once
//! 3. Per message, in order: fetch → extract → summarize → label → archive → buffer
//! 4. Flush the buffer to the output log in one append
//!
//! The first failure stops the run. Results gathered before it are still
//! flushed; mailbox changes already made are kept.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::error::{Error, JobError};
use crate::mail::{MailSource, MessageHandle, extract_text};
use crate::output::append_jsonl;
use crate::summary::{Summarizer, SummaryResult, UsageSnapshot, now_iso};

/// Where a run gets its messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Every message under a label.
    Label(String),
    /// Every message matching a search query.
    Query(String),
}

impl JobSource {
    /// Unread messages from one sender.
    pub fn unread_from(address: &str) -> Self {
        JobSource::Query(format!("from:{} is:unread", address.trim()))
    }
}

impl fmt::Display for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSource::Label(name) => write!(f, "label '{name}'"),
            JobSource::Query(q) => write!(f, "query '{q}'"),
        }
    }
}

/// Side effects and destination for a run.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Label to add to each summarized message; created on first use.
    pub apply_label: Option<String>,
    /// Remove each summarized message from the inbox.
    pub archive: bool,
    pub output_path: PathBuf,
}

impl JobOptions {
    /// Summarize only; no mailbox changes.
    pub fn read_only(output_path: impl Into<PathBuf>) -> Self {
        Self {
            apply_label: None,
            archive: false,
            output_path: output_path.into(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub run_id: Uuid,
    pub source: JobSource,
    pub summarized: usize,
    pub output_path: PathBuf,
    pub label: Option<String>,
    pub archived: usize,
    pub usage: UsageSnapshot,
}

impl JobReport {
    pub fn nothing_to_do(&self) -> bool {
        self.summarized == 0
    }

    /// One-line summary for the terminal.
    pub fn message(&self) -> String {
        if self.nothing_to_do() {
            return format!("Nothing to do: no messages matched {}.", self.source);
        }
        let mut msg = format!("{} emails summarized", self.summarized);
        if let Some(label) = &self.label {
            msg.push_str(&format!(" and labeled '{label}'"));
        }
        if self.archived > 0 {
            msg.push_str(&format!(", {} archived", self.archived));
        }
        msg.push_str(&format!(" → {}", self.output_path.display()));
        msg
    }
}

/// Runs digest jobs against a mailbox.
pub struct JobRunner {
    mail: Arc<dyn MailSource>,
    summarizer: Arc<Summarizer>,
}

impl JobRunner {
    pub fn new(mail: Arc<dyn MailSource>, summarizer: Arc<Summarizer>) -> Self {
        Self { mail, summarizer }
    }

    pub async fn run(
        &self,
        source: &JobSource,
        options: &JobOptions,
    ) -> Result<JobReport, JobError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("digest_run", run_id = %run_id);
        self.run_inner(run_id, source, options).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        source: &JobSource,
        options: &JobOptions,
    ) -> Result<JobReport, JobError> {
        info!(%source, output = %options.output_path.display(), "Starting digest run");

        let handles = match source {
            JobSource::Label(name) => self.mail.list_by_label(name).await,
            JobSource::Query(query) => self.mail.list_by_query(query).await,
        }
        .map_err(JobError::Listing)?;

        let mut report = JobReport {
            run_id,
            source: source.clone(),
            summarized: 0,
            output_path: options.output_path.clone(),
            label: options.apply_label.clone(),
            archived: 0,
            usage: UsageSnapshot::default(),
        };

        if handles.is_empty() {
            info!(%source, "No messages to summarize");
            return Ok(report);
        }
        info!(count = handles.len(), "Messages to summarize");

        let label_id = match options.apply_label.as_deref() {
            Some(name) => Some(self.mail.get_or_create_label(name).await.map_err(|source| {
                JobError::Label {
                    name: name.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        let mut results: Vec<SummaryResult> = Vec::with_capacity(handles.len());
        let mut failure: Option<(String, Error)> = None;

        for (index, handle) in handles.iter().enumerate() {
            if let Err(e) = self
                .process_one(handle, label_id.as_deref(), options.archive, &mut results)
                .await
            {
                error!(id = %handle.id, position = index + 1, error = %e, "Aborting run");
                failure = Some((handle.id.clone(), e));
                break;
            }
            if options.archive {
                report.archived += 1;
            }
        }

        let flushed = match (append_jsonl(&options.output_path, &results).await, failure) {
            (Ok(flushed), None) => flushed,
            (Ok(flushed), Some((message_id, e))) => {
                info!(flushed, "Flushed partial results");
                return Err(JobError::Aborted {
                    message_id,
                    flushed,
                    source: Box::new(e),
                });
            }
            (Err(flush_error), Some((message_id, e))) => {
                error!(error = %flush_error, pending = results.len(), "Partial flush failed");
                return Err(JobError::AbortedUnflushed {
                    message_id,
                    pending: results.len(),
                    flush_error,
                    source: Box::new(e),
                });
            }
            (Err(source), None) => {
                return Err(JobError::Flush {
                    count: results.len(),
                    source,
                });
            }
        };

        report.summarized = flushed;
        report.usage = self.summarizer.usage();
        info!(
            summarized = flushed,
            calls = report.usage.calls,
            input_tokens = report.usage.input_tokens,
            output_tokens = report.usage.output_tokens,
            cost_usd = %report.usage.cost,
            "Flushed summaries"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        handle: &MessageHandle,
        label_id: Option<&str>,
        archive: bool,
        results: &mut Vec<SummaryResult>,
    ) -> Result<(), Error> {
        let raw = self.mail.fetch_raw(&handle.id).await?;
        let text = extract_text(&handle.id, &raw)?;
        let date_iso = now_iso();

        let result = self
            .summarizer
            .summarize(&text.subject, &text.body, &date_iso)
            .await?;
        info!(
            id = %handle.id,
            subject = %result.subject,
            highlights = result.highlights.len(),
            "Summarized message"
        );

        if let Some(label_id) = label_id {
            self.mail.apply_label(&handle.id, label_id).await?;
        }
        if archive {
            self.mail.archive(&handle.id).await?;
        }
        results.push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(summarized: usize, label: Option<&str>, archived: usize) -> JobReport {
        JobReport {
            run_id: Uuid::new_v4(),
            source: JobSource::unread_from("news@example.com"),
            summarized,
            output_path: PathBuf::from("out.jsonl"),
            label: label.map(String::from),
            archived,
            usage: UsageSnapshot::default(),
        }
    }

    #[test]
    fn unread_query() {
        assert_eq!(
            JobSource::unread_from(" news@example.com "),
            JobSource::Query("from:news@example.com is:unread".to_string())
        );
    }

    #[test]
    fn report_messages() {
        assert_eq!(report(3, None, 0).message(), "3 emails summarized → out.jsonl");
        assert_eq!(
            report(2, Some("Digested"), 2).message(),
            "2 emails summarized and labeled 'Digested', 2 archived → out.jsonl"
        );
        let empty = report(0, Some("Digested"), 0);
        assert!(empty.nothing_to_do());
        assert!(empty.message().starts_with("Nothing to do"));
    }

    #[test]
    fn read_only_options() {
        let options = JobOptions::read_only("x.jsonl");
        assert!(options.apply_label.is_none());
        assert!(!options.archive);
    }
}
