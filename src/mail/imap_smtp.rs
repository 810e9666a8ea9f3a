//! IMAP polling for inbound, SMTP via lettre for outbound.
//!
//! Inbound fetching speaks raw IMAP over rustls and runs under
//! `spawn_blocking`. Bounce traffic and automated senders are dropped here
//! so they never reach classification or create phantom leads.

use std::collections::HashSet;
use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::MessageParser;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::{ConfigError, TransportError};
use crate::mail::{InboundEmail, MailTransport};

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox credentials and endpoints, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailerConfig {
    /// Build config from `EMAIL_*` environment variables.
    ///
    /// `EMAIL_IMAP_HOST`, `EMAIL_USERNAME` and `EMAIL_PASSWORD` are
    /// required; everything else has a sensible default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let require = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
        };

        let imap_host = require("EMAIL_IMAP_HOST")?;
        let username = require("EMAIL_USERNAME")?;
        let password = SecretString::from(require("EMAIL_PASSWORD")?);

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| smtp_host_for(&imap_host));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

/// Guess the SMTP endpoint from the IMAP one.
fn smtp_host_for(imap_host: &str) -> String {
    imap_host.replace("imap", "smtp")
}

// ── Transport ───────────────────────────────────────────────────────

/// Production transport: raw IMAP inbound + lettre SMTP outbound.
pub struct ImapSmtpTransport {
    config: MailerConfig,
    seen_messages: Mutex<HashSet<String>>,
    automated_senders: Vec<Regex>,
}

impl ImapSmtpTransport {
    pub fn new(config: MailerConfig) -> Self {
        let automated_senders = vec![
            Regex::new(r"(?i)^no[\-_.]?reply@").unwrap(),
            Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
            Regex::new(r"(?i)^(notifications?|alerts?|donotreply)@").unwrap(),
        ];
        Self {
            config,
            seen_messages: Mutex::new(HashSet::new()),
            automated_senders,
        }
    }

    /// Mail system / no-reply addresses that must never become leads.
    fn is_automated_sender(&self, address: &str) -> bool {
        self.automated_senders.iter().any(|r| r.is_match(address))
    }
}

#[async_trait]
impl MailTransport for ImapSmtpTransport {
    fn name(&self) -> &str {
        "imap-smtp"
    }

    async fn fetch_new(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InboundEmail>, TransportError> {
        let config = self.config.clone();
        let fetched = tokio::task::spawn_blocking(move || fetch_unseen_imap(&config))
            .await
            .map_err(|e| TransportError::Fetch(format!("fetch task panicked: {e}")))?
            .map_err(|e| TransportError::Fetch(e.to_string()))?;

        let mut inbound = Vec::new();
        for msg in fetched {
            let sender = msg.sender.to_lowercase();

            if sender.eq_ignore_ascii_case(&self.config.from_address) {
                tracing::debug!(sender = %sender, "Skipping self-sent mail");
                continue;
            }
            if self.is_automated_sender(&sender) {
                tracing::debug!(sender = %sender, "Skipping automated sender");
                continue;
            }
            if since.is_some_and(|cp| msg.received_at <= cp) {
                continue;
            }
            {
                let mut seen = self.seen_messages.lock().unwrap();
                if !seen.insert(msg.message_id.clone()) {
                    continue;
                }
            }

            inbound.push(InboundEmail {
                from_identity: sender,
                subject: msg.subject,
                body_text: msg.body,
                received_at: msg.received_at,
            });
        }

        inbound.sort_by_key(|m| m.received_at);
        tracing::info!(count = inbound.len(), "Fetched inbound mail");
        Ok(inbound)
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| TransportError::Connect {
                host: self.config.smtp_host.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| TransportError::InvalidAddress {
                        address: self.config.from_address.clone(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(to.parse().map_err(|e| TransportError::InvalidAddress {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| TransportError::Send {
                to: to.to_string(),
                reason: format!("Failed to build message: {e}"),
            })?;

        transport.send(&email).map_err(|e| TransportError::Send {
            to: to.to_string(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        tracing::info!(to = %to, "Mail sent");
        Ok(())
    }
}

// ── IMAP fetch (blocking) ───────────────────────────────────────────

/// A fetched raw email, before engine-level filtering.
struct FetchedEmail {
    message_id: String,
    sender: String,
    subject: Option<String>,
    body: String,
    received_at: DateTime<Utc>,
}

type ImapError = Box<dyn std::error::Error + Send + Sync>;

/// Fetch unseen emails via raw IMAP over TLS (blocking — run in
/// spawn_blocking). Fetched messages are marked `\Seen`.
fn fetch_unseen_imap(config: &MailerConfig) -> Result<Vec<FetchedEmail>, ImapError> {
    use std::sync::Arc;

    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    let read_line =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>| -> Result<String, ImapError> {
            let mut buf = Vec::new();
            loop {
                let mut byte = [0u8; 1];
                match std::io::Read::read(tls, &mut byte) {
                    Ok(0) => return Err("IMAP connection closed".into()),
                    Ok(_) => {
                        buf.push(byte[0]);
                        if buf.ends_with(b"\r\n") {
                            return Ok(String::from_utf8_lossy(&buf).to_string());
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

    let send_cmd =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
         tag: &str,
         cmd: &str|
         -> Result<Vec<String>, ImapError> {
            let full = format!("{tag} {cmd}\r\n");
            IoWrite::write_all(tls, full.as_bytes())?;
            IoWrite::flush(tls)?;
            let mut lines = Vec::new();
            loop {
                let line = read_line(tls)?;
                let done = line.starts_with(tag);
                lines.push(line);
                if done {
                    break;
                }
            }
            Ok(lines)
        };

    let _greeting = read_line(&mut tls)?;

    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.password.expose_secret()
        ),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err("IMAP login failed".into());
    }

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let search_resp = send_cmd(&mut tls, "A3", "SEARCH UNSEEN")?;
    let mut uids: Vec<&str> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend_from_slice(&parts[2..]);
            }
        }
    }

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for uid in &uids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {uid} RFC822"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            results.push(FetchedEmail {
                message_id: parsed
                    .message_id()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4())),
                sender: extract_sender(&parsed),
                subject: parsed.subject().map(|s| s.to_string()),
                body: extract_text(&parsed),
                received_at: extract_date(&parsed),
            });
        }

        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let _ = send_cmd(&mut tls, &store_tag, &format!("STORE {uid} +FLAGS (\\Seen)"));
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

// ── Message extraction ──────────────────────────────────────────────

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable body text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Extract the sent date, falling back to the current time.
fn extract_date(parsed: &mail_parser::Message) -> DateTime<Utc> {
    parsed
        .date()
        .and_then(|d| {
            chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                .and_then(|date| {
                    date.and_hms_opt(
                        u32::from(d.hour),
                        u32::from(d.minute),
                        u32::from(d.second),
                    )
                })
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(Utc::now)
}

/// Strip HTML tags from content (basic).
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
