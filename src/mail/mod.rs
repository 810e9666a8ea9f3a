//! Mail transport abstraction — pure I/O, no nurturing logic.
//!
//! The engine talks to the mailbox through `MailTransport`; the production
//! implementation lives in `imap_smtp`. Tests substitute scripted
//! transports.

pub mod imap_smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
pub use imap_smtp::{ImapSmtpTransport, MailerConfig};

/// One inbound message, already reduced to what the engine needs.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Sender address, lower-cased.
    pub from_identity: String,
    pub subject: Option<String>,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
}

/// Send/fetch seam to the mailbox provider.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    /// Fetch inbound messages newer than `since` (`None` = everything
    /// unseen). May over-fetch; the orchestrator filters on its checkpoint.
    async fn fetch_new(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboundEmail>, TransportError>;

    /// Send one message. Failures are per-recipient, never fatal to a cycle.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}
