//! Lead persistence — the ground truth all other components read and mutate.
//!
//! Reads go straight through the `LeadStore` trait. Mutations flow through a
//! working snapshot (`LeadBook`) taken with `begin()` and handed back to
//! `commit()`, which persists leads and checkpoint as one unit. A failed
//! commit leaves both memory and disk on the previous snapshot, so a cycle
//! either lands completely or not at all.

pub mod json_file;
pub mod lead;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
pub use json_file::JsonFileStore;
pub use lead::{EventKind, HistoryEvent, LeadRecord, LeadStatus, normalize_identity};

/// The persisted unit: every lead plus the inbound checkpoint, stored
/// together so they load and save atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadBook {
    /// Timestamp of the last successfully processed inbound message.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Records in first-insertion order.
    leads: Vec<LeadRecord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LeadBook {
    /// Rebuild the identity index. Must run after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.index = self
            .leads
            .iter()
            .enumerate()
            .map(|(i, lead)| (lead.identity.clone(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    /// Look up a record by identity (case-insensitive).
    pub fn get(&self, identity: &str) -> Option<&LeadRecord> {
        let key = normalize_identity(identity);
        self.index.get(&key).map(|&i| &self.leads[i])
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut LeadRecord> {
        let key = normalize_identity(identity);
        self.index.get(&key).map(|&i| &mut self.leads[i])
    }

    /// Atomic replace-or-insert by identity. New identities keep
    /// first-insertion order.
    pub fn upsert(&mut self, record: LeadRecord) {
        match self.index.get(&record.identity) {
            Some(&i) => self.leads[i] = record,
            None => {
                self.index.insert(record.identity.clone(), self.leads.len());
                self.leads.push(record);
            }
        }
    }

    /// Fetch a record, creating a fresh `new`-status one if absent.
    pub fn get_or_create(&mut self, identity: &str) -> &mut LeadRecord {
        let key = normalize_identity(identity);
        if !self.index.contains_key(&key) {
            self.upsert(LeadRecord::new(&key));
        }
        self.get_mut(&key).unwrap()
    }

    /// Append one history entry to an existing record.
    ///
    /// Returns `false` when the identity is unknown.
    pub fn append_history(&mut self, identity: &str, event: HistoryEvent) -> bool {
        match self.get_mut(identity) {
            Some(lead) => {
                lead.history.push(event);
                true
            }
            None => false,
        }
    }

    /// Snapshot iteration in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LeadRecord> {
        self.leads.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LeadRecord> {
        self.leads.iter_mut()
    }
}

/// Durable identity → record mapping.
///
/// Reads return clones of the committed state. All mutation goes through
/// `begin`/`commit`; nothing is written outside an active cycle (or the
/// one-shot bulk seed, which uses the same path).
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Committed record for an identity, if any.
    async fn get(&self, identity: &str) -> Option<LeadRecord>;

    /// Committed records, first-insertion order.
    async fn all_records(&self) -> Vec<LeadRecord>;

    /// Committed inbound checkpoint.
    async fn checkpoint(&self) -> Option<DateTime<Utc>>;

    /// Take a working snapshot for mutation.
    async fn begin(&self) -> LeadBook;

    /// Persist a working snapshot — leads and checkpoint as one unit.
    async fn commit(&self, book: LeadBook) -> Result<(), StoreError>;
}
