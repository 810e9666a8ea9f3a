//! JSON file backend — atomic single-document persistence.
//!
//! The whole book (leads + checkpoint) is one JSON document. Commits write
//! a sibling temp file and rename it over the target, so readers and crash
//! recovery only ever observe a complete snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{LeadBook, LeadRecord, LeadStore};

/// File-backed lead store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    state: RwLock<LeadBook>,
}

impl JsonFileStore {
    /// Open (or create) a store file.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let book = match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let mut book: LeadBook =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                book.reindex();
                book
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LeadBook::default(),
            Err(e) => return Err(StoreError::Io(e)),
        };

        info!(path = %path.display(), leads = book.len(), "Lead store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(book),
        })
    }

    /// Memory-only store (for tests).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(LeadBook::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Serialize and atomically replace the store file.
    async fn persist(&self, book: &LeadBook) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let raw =
            serde_json::to_string_pretty(book).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, raw.as_bytes()).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), leads = book.len(), "Lead store persisted");
        Ok(())
    }
}

/// Sibling temp file used for atomic replacement.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl LeadStore for JsonFileStore {
    async fn get(&self, identity: &str) -> Option<LeadRecord> {
        self.state.read().await.get(identity).cloned()
    }

    async fn all_records(&self) -> Vec<LeadRecord> {
        self.state.read().await.iter().cloned().collect()
    }

    async fn checkpoint(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.checkpoint
    }

    async fn begin(&self) -> LeadBook {
        self.state.read().await.clone()
    }

    async fn commit(&self, book: LeadBook) -> Result<(), StoreError> {
        // Disk first: a failed write must leave the committed state alone.
        self.persist(&book).await?;
        *self.state.write().await = book;
        Ok(())
    }
}
