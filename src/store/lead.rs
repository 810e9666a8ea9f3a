//! Lead record model.
//!
//! A `LeadRecord` is the ground truth for one contact. Status moves forward
//! only (`new → contacted → responded → {interested | not_interested}`);
//! the two terminal states are never left by the engine. Every status
//! change and every send/response event appends exactly one history entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a lead is in the nurturing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Responded,
    Interested,
    NotInterested,
}

impl LeadStatus {
    /// Terminal statuses receive no further automated action.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Interested | Self::NotInterested)
    }

    /// Position along the allowed transition graph.
    fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Contacted => 1,
            Self::Responded => 2,
            Self::Interested | Self::NotInterested => 3,
        }
    }

    /// Short label for logging and reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Responded => "responded",
            Self::Interested => "interested",
            Self::NotInterested => "not_interested",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Contacted,
    FollowUpSent,
    ResponseReceived,
    InterestReplySent,
    StatusChanged,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Contacted => "contacted",
            Self::FollowUpSent => "follow_up_sent",
            Self::ResponseReceived => "response_received",
            Self::InterestReplySent => "interest_reply_sent",
            Self::StatusChanged => "status_changed",
        }
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

/// One tracked contact, keyed by lower-cased email address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub identity: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub status: LeadStatus,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub first_contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub follow_ups_sent: u32,
    #[serde(default)]
    pub last_response_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

/// Normalize an identity for case-insensitive equality.
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

impl LeadRecord {
    /// Fresh record in status `new`.
    pub fn new(identity: &str) -> Self {
        Self {
            identity: normalize_identity(identity),
            attributes: BTreeMap::new(),
            status: LeadStatus::New,
            score: 0,
            first_contacted_at: None,
            last_contacted_at: None,
            follow_ups_sent: 0,
            last_response_at: None,
            history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move status forward, appending one `StatusChanged` history entry.
    ///
    /// Returns `false` (and changes nothing) when the record is terminal or
    /// the target is not strictly ahead of the current status.
    pub fn advance_to(&mut self, target: LeadStatus, at: DateTime<Utc>, detail: &str) -> bool {
        if self.status.is_terminal() || target.rank() <= self.status.rank() {
            return false;
        }
        let from = self.status;
        self.status = target;
        self.record(
            EventKind::StatusChanged,
            format!("{} -> {}: {}", from.label(), target.label(), detail),
            at,
        );
        true
    }

    /// Append one history entry.
    pub fn record(&mut self, kind: EventKind, detail: impl Into<String>, at: DateTime<Utc>) {
        self.history.push(HistoryEvent {
            at,
            kind,
            detail: detail.into(),
        });
    }
}
