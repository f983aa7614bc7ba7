//! JSON persistence for file indexes
//!
//! Loading is two-phase: the snapshot is decoded into plain data first, and
//! a fingerprinter is bound to it afterwards.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexErrorKind};
use crate::fingerprint::Fingerprinter;
use crate::index::FileIndex;
use crate::models::IndexedEntry;
use crate::walker::is_contained_key;

/// Plain-data form of a [`FileIndex`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot<T> {
    /// Root directory of the index
    pub root: PathBuf,
    /// Entries keyed by relative path, sorted for stable output
    pub entries: BTreeMap<String, IndexedEntry<T>>,
}

impl<T: Serialize + DeserializeOwned> IndexSnapshot<T> {
    /// Read and decode a snapshot file
    pub fn read(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::not_found(path.to_path_buf()));
        }

        let json = fs::read_to_string(path).map_err(|e| IndexError::io(path, e))?;
        let snapshot: Self = serde_json::from_str(&json)
            .map_err(|e| IndexError::parse(path.to_path_buf(), e.to_string()))?;

        if let Some((key, entry)) = snapshot
            .entries
            .iter()
            .find(|(key, entry)| **key != entry.relative_path)
        {
            return Err(IndexError::parse(
                path.to_path_buf(),
                format!("entry {:?} is stored under key {:?}", entry.relative_path, key),
            ));
        }
        if let Some(key) = snapshot.entries.keys().find(|key| !is_contained_key(key)) {
            return Err(IndexError::parse(
                path.to_path_buf(),
                format!("key {:?} does not name a path below the root", key),
            ));
        }
        Ok(snapshot)
    }

    /// Encode the snapshot to `path`, replacing any existing file
    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path).map_err(|e| IndexError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| {
            IndexError::new(IndexErrorKind::Io, Some(path.to_path_buf()), e.to_string())
        })?;
        writer.flush().map_err(|e| IndexError::io(path, e))?;
        Ok(())
    }
}

impl<H: Fingerprinter> FileIndex<H> {
    /// Plain-data copy of the index
    pub fn snapshot(&self) -> IndexSnapshot<H::Output> {
        IndexSnapshot {
            root: self.root.clone(),
            entries: self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    /// Persist root and entries to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let path = path.as_ref();
        self.snapshot().write(path)?;
        log::debug!("Saved {} entries to {:?}", self.len(), path);
        Ok(())
    }

    /// Restore an index saved with [`FileIndex::save`].
    ///
    /// Fails with `NotFound` if `path` is missing and `Parse` if it cannot
    /// be decoded. Indexed files are not looked at; staleness is picked up
    /// by the next [`FileIndex::update`].
    pub fn load(path: impl AsRef<Path>, fingerprinter: H) -> Result<Self, IndexError> {
        Self::load_with_config(path, fingerprinter, IndexConfig::default())
    }

    /// [`FileIndex::load`] with explicit settings
    pub fn load_with_config(
        path: impl AsRef<Path>,
        fingerprinter: H,
        config: IndexConfig,
    ) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let snapshot = IndexSnapshot::read(path)?;
        log::debug!("Loaded {} entries from {:?}", snapshot.entries.len(), path);
        Ok(Self::from_snapshot(snapshot, fingerprinter, config))
    }

    /// Bind a fingerprinter to decoded snapshot data
    pub fn from_snapshot(
        snapshot: IndexSnapshot<H::Output>,
        fingerprinter: H,
        config: IndexConfig,
    ) -> Self {
        let entries: DashMap<_, _> = snapshot.entries.into_iter().collect();
        Self {
            root: snapshot.root,
            entries,
            fingerprinter,
            config,
        }
    }
}
