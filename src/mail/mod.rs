//! Mailbox access.
//!
//! `MailSource` is the seam between the job runner and the mail provider.
//! `GmailClient` implements it over the Gmail REST API; tests supply
//! in-memory fakes.

pub mod auth;
pub mod extract;
pub mod gmail;

pub use auth::{AccessTokenSource, GoogleAuth, GoogleAuthConfig, StaticToken};
pub use extract::{ExtractedText, extract_text, html_to_text};
pub use gmail::GmailClient;

use async_trait::async_trait;

use crate::error::MailError;

/// Reference to a message returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub id: String,
    pub thread_id: Option<String>,
}

impl MessageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// A mailbox label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Operations the digest jobs need from a mailbox.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Every message carrying the named label, across all pages.
    /// The label is created if it does not exist yet.
    async fn list_by_label(&self, label_name: &str) -> Result<Vec<MessageHandle>, MailError>;

    /// Every message matching a provider search query, across all pages.
    async fn list_by_query(&self, query: &str) -> Result<Vec<MessageHandle>, MailError>;

    /// Full RFC 822 bytes of one message.
    async fn fetch_raw(&self, message_id: &str) -> Result<Vec<u8>, MailError>;

    async fn list_labels(&self) -> Result<Vec<Label>, MailError>;

    /// Id of the label named `name`, creating it when missing.
    async fn get_or_create_label(&self, name: &str) -> Result<String, MailError>;

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError>;

    async fn remove_label(&self, message_id: &str, label_id: &str) -> Result<(), MailError>;

    /// Remove the message from the inbox.
    async fn archive(&self, message_id: &str) -> Result<(), MailError>;
}
