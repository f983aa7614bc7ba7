//! Master/current validation with cached indexes
//!
//! Each tree's index is cached as a JSON file in the tree's parent
//! directory, so the cache never shows up inside the tree it describes.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ValidatorConfig;
use crate::error::IndexError;
use crate::fingerprint::Fingerprinter;
use crate::index::FileIndex;
use crate::models::{IndexOutcome, ReconcileReport};
use crate::reconcile::reconcile;

/// Where a loaded index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    /// Read from the cache file as-is
    Cached,
    /// Read from the cache file, then refreshed with an update pass
    Updated,
    /// Built from scratch
    Built,
}

/// An index plus how it was obtained
#[derive(Debug)]
pub struct LoadedIndex<H: Fingerprinter> {
    pub index: FileIndex<H>,
    pub source: IndexSource,
    /// Outcome of the build or update pass, if one ran
    pub outcome: Option<IndexOutcome>,
}

impl<H: Fingerprinter> LoadedIndex<H> {
    /// Bytes fingerprinted while obtaining this index
    pub fn bytes_fingerprinted(&self) -> u64 {
        self.outcome.as_ref().map_or(0, |o| o.bytes_fingerprinted)
    }

    /// Per-file errors from the build or update pass
    pub fn error_count(&self) -> usize {
        self.outcome.as_ref().map_or(0, |o| o.error_count())
    }
}

/// Result of one validation run
#[derive(Debug, Serialize)]
pub struct ValidationSummary {
    pub master_source: IndexSource,
    pub current_source: IndexSource,
    pub master_files: usize,
    pub current_files: usize,
    /// Files that could not be indexed in either tree
    pub index_errors: usize,
    pub bytes_fingerprinted: u64,
    pub repair: bool,
    pub report: ReconcileReport,
    pub duration_ms: u64,
}

impl ValidationSummary {
    /// Number of discrepancies found
    pub fn error_count(&self) -> usize {
        self.report.count()
    }
}

/// Result of a benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub runs: usize,
    pub bytes_fingerprinted: u64,
    pub total_secs: f64,
    pub average_secs: f64,
}

impl BenchmarkSummary {
    /// Fingerprinting throughput in bytes per second
    pub fn bytes_per_sec(&self) -> f64 {
        if self.total_secs > 0.0 {
            self.bytes_fingerprinted as f64 / self.total_secs
        } else {
            0.0
        }
    }
}

/// Cache file location for `target`: `name` inside `target`'s parent
pub fn index_path(target: &Path, name: &str) -> Result<PathBuf, IndexError> {
    let target = std::path::absolute(target).map_err(|e| IndexError::io(target, e))?;
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.join(name)),
        _ => Err(IndexError::invalid_path(
            target.clone(),
            "target directory has no parent to hold its index",
        )),
    }
}

/// Try the cache for `target`.
///
/// `Ok(None)` means the cache is absent, unreadable as an index, or
/// describes some other tree (sibling trees share a parent directory).
fn load_cached<H: Fingerprinter>(
    target: &Path,
    cache: &Path,
    fingerprinter: H,
    config: &ValidatorConfig,
) -> Result<Option<FileIndex<H>>, IndexError> {
    if !config.use_cache {
        return Ok(None);
    }
    let target = std::path::absolute(target).map_err(|e| IndexError::io(target, e))?;
    match FileIndex::load_with_config(cache, fingerprinter, config.index.clone()) {
        Ok(index) if index.root() == target => Ok(Some(index)),
        Ok(index) => {
            log::info!(
                "Ignoring cache @ {}: it indexes {:?}, not {:?}",
                cache.display(),
                index.root(),
                target
            );
            Ok(None)
        }
        Err(e) if e.is_cache_miss() => {
            log::debug!("No usable cache @ {}: {}", cache.display(), e.message);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Load the master index from cache, or build it and cache it.
///
/// The master is the reference tree, so a cached master is used as-is.
pub fn load_master_index<H: Fingerprinter + Clone>(
    master_dir: &Path,
    fingerprinter: H,
    config: &ValidatorConfig,
) -> Result<LoadedIndex<H>, IndexError> {
    let cache = index_path(master_dir, &config.master_index_name)?;

    if let Some(index) = load_cached(master_dir, &cache, fingerprinter.clone(), config)? {
        log::info!("Loaded MASTER cache @ {}", cache.display());
        return Ok(LoadedIndex {
            index,
            source: IndexSource::Cached,
            outcome: None,
        });
    }

    let mut index = FileIndex::with_config(master_dir, fingerprinter, config.index.clone());
    let outcome = index.build()?;
    if config.use_cache {
        index.save(&cache)?;
        log::info!("Cached MASTER @ {}", cache.display());
    }

    Ok(LoadedIndex {
        index,
        source: IndexSource::Built,
        outcome: Some(outcome),
    })
}

/// Load the current index from cache and bring it up to date, or build it.
///
/// The cache is rewritten after a fresh build, or when the update changed
/// something.
pub fn load_current_index<H: Fingerprinter + Clone>(
    current_dir: &Path,
    fingerprinter: H,
    config: &ValidatorConfig,
) -> Result<LoadedIndex<H>, IndexError> {
    let cache = index_path(current_dir, &config.current_index_name)?;

    let cached = load_cached(current_dir, &cache, fingerprinter.clone(), config)?;
    let (index, source, outcome) = match cached {
        Some(mut index) => {
            log::info!("Loaded CURRENT cache @ {}", cache.display());
            log::info!("Checking CURRENT cache for changes");
            let outcome = index.update()?;
            (index, IndexSource::Updated, outcome)
        }
        None => {
            let mut index =
                FileIndex::with_config(current_dir, fingerprinter, config.index.clone());
            let outcome = index.build()?;
            (index, IndexSource::Built, outcome)
        }
    };

    if config.use_cache {
        if source == IndexSource::Built {
            index.save(&cache)?;
            log::info!("Cached CURRENT @ {}", cache.display());
        } else if outcome.changes() > 0 {
            index.save(&cache)?;
            log::info!("Updated CURRENT cache @ {}", cache.display());
        }
    }

    Ok(LoadedIndex {
        index,
        source,
        outcome: Some(outcome),
    })
}

/// Delete both cached indexes. Missing cache files are not an error.
pub fn reset_indexes(
    master_dir: &Path,
    current_dir: &Path,
    config: &ValidatorConfig,
) -> Result<(), IndexError> {
    for cache in [
        index_path(master_dir, &config.master_index_name)?,
        index_path(current_dir, &config.current_index_name)?,
    ] {
        match fs::remove_file(&cache) {
            Ok(()) => log::info!("Removed index @ {}", cache.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(IndexError::io(&cache, e)),
        }
    }
    Ok(())
}

fn require_dir(dir: &Path) -> Result<(), IndexError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(IndexError::not_found(dir.to_path_buf()))
    }
}

/// Load both indexes concurrently and reconcile current against master
pub fn validate<H: Fingerprinter + Clone>(
    master_dir: &Path,
    current_dir: &Path,
    fingerprinter: H,
    config: &ValidatorConfig,
) -> Result<ValidationSummary, IndexError> {
    require_dir(master_dir)?;
    require_dir(current_dir)?;
    let start = Instant::now();

    let (master, current) = rayon::join(
        || load_master_index(master_dir, fingerprinter.clone(), config),
        || load_current_index(current_dir, fingerprinter.clone(), config),
    );
    let (master, current) = (master?, current?);

    let report = reconcile(&master.index, &current.index, config.repair);

    let summary = ValidationSummary {
        master_source: master.source,
        current_source: current.source,
        master_files: master.index.len(),
        current_files: current.index.len(),
        index_errors: master.error_count() + current.error_count(),
        bytes_fingerprinted: master.bytes_fingerprinted() + current.bytes_fingerprinted(),
        repair: config.repair,
        report,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if summary.report.is_clean() {
        log::info!("Validated CURRENT in {}ms", summary.duration_ms);
    } else if config.repair {
        log::warn!(
            "Found and fixed {} errors in {}ms ({} repair failures)",
            summary.error_count(),
            summary.duration_ms,
            summary.report.repair_failures.len()
        );
    } else {
        log::warn!("Found {} errors in {}ms", summary.error_count(), summary.duration_ms);
    }
    Ok(summary)
}

/// Repeatedly build both indexes from scratch without touching any file
pub fn benchmark<H: Fingerprinter + Clone>(
    master_dir: &Path,
    current_dir: &Path,
    fingerprinter: H,
    config: &ValidatorConfig,
) -> Result<BenchmarkSummary, IndexError> {
    require_dir(master_dir)?;
    require_dir(current_dir)?;
    let runs = config.benchmark_runs.max(1);

    let mut uncached = config.clone();
    uncached.use_cache = false;
    uncached.repair = false;

    log::info!("Running {} benchmark passes", runs);
    let start = Instant::now();
    let mut bytes = 0;
    for run in 0..runs {
        log::info!("\t{}/{}", run + 1, runs);
        let (master, current) = rayon::join(
            || load_master_index(master_dir, fingerprinter.clone(), &uncached),
            || load_current_index(current_dir, fingerprinter.clone(), &uncached),
        );
        bytes += master?.bytes_fingerprinted() + current?.bytes_fingerprinted();
    }

    let total_secs = start.elapsed().as_secs_f64();
    let summary = BenchmarkSummary {
        runs,
        bytes_fingerprinted: bytes,
        total_secs,
        average_secs: total_secs / runs as f64,
    };
    log::info!(
        "Validated {} bytes in {:.2}s, average cycle {:.2}s",
        summary.bytes_fingerprinted,
        summary.total_secs,
        summary.average_secs
    );
    Ok(summary)
}
