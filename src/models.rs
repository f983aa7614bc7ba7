//! Core data models for the file index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::IndexError;

/// What a build or update pass did to one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Path had no entry and was fingerprinted
    #[default]
    Inserted,
    /// Path was stale and was fingerprinted again
    Refreshed,
    /// Entry was newer than the file, nothing recomputed
    Unchanged,
    /// Entry dropped: the file vanished, or changed and could not be
    /// fingerprinted again
    Removed,
}

impl EntryStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Inserted => "inserted",
            EntryStatus::Refreshed => "refreshed",
            EntryStatus::Unchanged => "unchanged",
            EntryStatus::Removed => "removed",
        }
    }

    /// Whether this status counts as a change to the index
    pub fn is_change(&self) -> bool {
        !matches!(self, EntryStatus::Unchanged)
    }
}

/// One indexed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntry<T> {
    /// Path relative to the index root, `/`-separated
    pub relative_path: String,
    /// Content fingerprint
    pub fingerprint: T,
    /// When the fingerprint was computed (not the file's mtime)
    pub indexed_at: DateTime<Utc>,
}

impl<T> IndexedEntry<T> {
    /// Create an entry stamped with the current time
    pub fn new(relative_path: String, fingerprint: T) -> Self {
        Self::stamped(relative_path, fingerprint, Utc::now())
    }

    /// Create an entry with an explicit index time
    pub fn stamped(relative_path: String, fingerprint: T, indexed_at: DateTime<Utc>) -> Self {
        Self {
            relative_path,
            fingerprint,
            indexed_at,
        }
    }

    /// Whether the entry was computed strictly after `modified`
    pub fn is_fresh(&self, modified: DateTime<Utc>) -> bool {
        self.indexed_at > modified
    }
}

/// Result of a build or update pass
#[derive(Debug, Default, Serialize)]
pub struct IndexOutcome {
    /// Number of regular files discovered under the root
    pub total_files: u64,
    /// Entries created for paths that were not indexed before
    pub inserted: u64,
    /// Stale entries recomputed
    pub refreshed: u64,
    /// Entries left as they were
    pub unchanged: u64,
    /// Orphan entries dropped
    pub removed: u64,
    /// Keys of the dropped entries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_paths: Vec<String>,
    /// Bytes fed to the fingerprint function
    pub bytes_fingerprinted: u64,
    /// Per-file failures; those files were skipped
    #[serde(skip)]
    pub errors: Vec<IndexError>,
    /// Total pass duration in milliseconds
    pub duration_ms: u64,
}

impl IndexOutcome {
    /// Create a new empty outcome
    pub fn new() -> Self {
        Self::default()
    }

    /// Insertions + refreshes + removals
    pub fn changes(&self) -> u64 {
        self.inserted + self.refreshed + self.removed
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Check if the pass completed without per-file errors
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn record(&mut self, status: EntryStatus) {
        match status {
            EntryStatus::Inserted => self.inserted += 1,
            EntryStatus::Refreshed => self.refreshed += 1,
            EntryStatus::Unchanged => self.unchanged += 1,
            EntryStatus::Removed => self.removed += 1,
        }
    }
}

/// A master path whose counterpart in current is missing or differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Key shared by both indexes
    pub relative_path: String,
    /// `master.root/relative_path`
    pub master_path: PathBuf,
    /// `current.root/relative_path`
    pub current_path: PathBuf,
    /// True when current has no entry at all
    pub missing: bool,
}

/// A repair copy that failed
#[derive(Debug, Serialize)]
pub struct RepairFailure {
    /// Key of the discrepancy being repaired
    pub relative_path: String,
    /// Error message
    pub message: String,
    /// Underlying error
    #[serde(skip)]
    pub error: IndexError,
}

/// Result of reconciling a master index against a current index
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Every mismatch found, in key order
    pub discrepancies: Vec<Discrepancy>,
    /// Number of discrepancies successfully overwritten from master
    pub repaired: u64,
    /// Copies that failed during repair
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repair_failures: Vec<RepairFailure>,
}

impl ReconcileReport {
    /// Number of discrepancies, whether or not they were repaired
    pub fn count(&self) -> usize {
        self.discrepancies.len()
    }

    /// True when master and current agree on every master path
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}
