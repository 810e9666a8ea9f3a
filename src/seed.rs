//! Bulk initial outreach from a contact CSV.
//!
//! One-shot: parse the contact list, render the initial template per
//! contact, send with a per-minute rate limit, and record each new lead as
//! `contacted`. Already-contacted identities are skipped, so re-running
//! the same file resumes where the last run stopped. Not part of the
//! nurturing state machine — it only creates the records the cycles act on.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NurtureConfig;
use crate::engine::SendFailure;
use crate::error::{ConfigError, Error};
use crate::mail::MailTransport;
use crate::store::{EventKind, LeadStatus, LeadStore, normalize_identity};

/// Bulk-send options.
#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    /// Outbound rate limit.
    pub per_minute: u32,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self { per_minute: 12 }
    }
}

/// What one seed run did.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub sent: usize,
    pub skipped: usize,
    pub errors: Vec<SendFailure>,
}

impl std::fmt::Display for SeedSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sent, {} skipped, {} errors",
            self.sent,
            self.skipped,
            self.errors.len()
        )?;
        for err in &self.errors {
            write!(f, "\n  {}: {}", err.identity, err.reason)?;
        }
        Ok(())
    }
}

/// Send the initial outreach to every contact in `csv_path`.
///
/// The CSV must have a `to` column; every other column becomes a lead
/// attribute available to templates.
pub async fn seed_from_csv(
    csv_path: &Path,
    store: Arc<dyn LeadStore>,
    transport: Arc<dyn MailTransport>,
    config: &NurtureConfig,
    options: SeedOptions,
    now: DateTime<Utc>,
) -> Result<SeedSummary, Error> {
    let raw = tokio::fs::read_to_string(csv_path)
        .await
        .map_err(|e| Error::Config(ConfigError::Io(e)))?;
    let rows = parse_csv(&raw).map_err(|reason| {
        Error::Config(ConfigError::InvalidValue {
            key: csv_path.display().to_string(),
            message: reason,
        })
    })?;

    let mut book = store.begin().await;
    let mut summary = SeedSummary {
        sent: 0,
        skipped: 0,
        errors: Vec::new(),
    };

    let delay = Duration::from_secs_f64(60.0 / f64::from(options.per_minute.max(1)));
    let mut first_send = true;

    for row in rows {
        let Some(to) = row.get("to").map(|v| normalize_identity(v)) else {
            continue;
        };
        if to.is_empty() {
            continue;
        }

        // Resume: anyone already past `new` has had the initial send.
        if book.get(&to).is_some_and(|lead| lead.status != LeadStatus::New) {
            summary.skipped += 1;
            continue;
        }

        let (subject, body) = config.templates.initial.render(&row);

        if !first_send {
            tokio::time::sleep(delay).await;
        }
        first_send = false;

        match transport.send(&to, &subject, &body).await {
            Ok(()) => {
                let lead = book.get_or_create(&to);
                lead.attributes = row;
                lead.first_contacted_at.get_or_insert(now);
                lead.last_contacted_at = Some(now);
                lead.record(EventKind::Contacted, "initial outreach sent", now);
                lead.advance_to(LeadStatus::Contacted, now, "initial outreach");
                summary.sent += 1;
            }
            Err(e) => {
                warn!(identity = %to, error = %e, "Initial send failed");
                summary.errors.push(SendFailure {
                    identity: to,
                    reason: e.to_string(),
                });
            }
        }
    }

    store.commit(book).await?;
    info!(%summary, "Seed run complete");
    Ok(summary)
}

/// Minimal CSV parsing: header row, quoted fields with `""` escapes,
/// CR/LF line endings. Returns one attribute map per data row.
fn parse_csv(input: &str) -> Result<Vec<BTreeMap<String, String>>, String> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".into());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        if record.iter().any(|f| !f.is_empty()) {
            records.push(record);
        }
    }

    let mut rows = records.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| "empty contact file".to_string())?
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    if !header.iter().any(|h| h == "to") {
        return Err(format!("missing required 'to' column (found: {header:?})"));
    }

    Ok(rows
        .map(|fields| {
            header
                .iter()
                .cloned()
                .zip(fields.into_iter().chain(std::iter::repeat(String::new())))
                .collect()
        })
        .collect())
}
