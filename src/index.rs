//! File index - relative path to content fingerprint, built and refreshed
//! in parallel

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexErrorKind};
use crate::fingerprint::Fingerprinter;
use crate::models::{EntryStatus, IndexOutcome, IndexedEntry};
use crate::progress::{IndexPhase, PassMode, ProgressReporter};
use crate::walker::{enumerate_directories, list_files, relative_key, resolve_key};

/// Index of every regular file under a root directory.
///
/// Entries are only created, replaced and dropped by [`FileIndex::build`]
/// and [`FileIndex::update`]. The fingerprinter and config are never
/// persisted; see [`FileIndex::load`].
pub struct FileIndex<H: Fingerprinter> {
    pub(crate) root: PathBuf,
    pub(crate) entries: DashMap<String, IndexedEntry<H::Output>>,
    pub(crate) fingerprinter: H,
    pub(crate) config: IndexConfig,
}

/// Shared counters for one pass
struct PassCounters {
    total: u64,
    completed: AtomicU64,
    bytes: AtomicU64,
}

impl<H: Fingerprinter> FileIndex<H> {
    /// Create an empty index bound to `root`
    pub fn new(root: impl Into<PathBuf>, fingerprinter: H) -> Self {
        Self::with_config(root, fingerprinter, IndexConfig::default())
    }

    /// Create an empty index with explicit settings
    pub fn with_config(root: impl Into<PathBuf>, fingerprinter: H, config: IndexConfig) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            entries: DashMap::new(),
            fingerprinter,
            config,
        }
    }

    /// Root directory all keys are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Copy of the entry for `key`
    pub fn get(&self, key: &str) -> Option<IndexedEntry<H::Output>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Fingerprint recorded for `key`
    pub fn fingerprint_of(&self, key: &str) -> Option<H::Output> {
        self.entries.get(key).map(|e| e.fingerprint.clone())
    }

    /// `root/key` as a filesystem path
    pub fn absolute_path(&self, key: &str) -> PathBuf {
        resolve_key(&self.root, key)
    }

    /// Fingerprint every file under the root, replacing any previous entries.
    ///
    /// A file that cannot be opened or fingerprinted gets no entry; its
    /// error is collected in the outcome and the rest of the pass continues.
    pub fn build(&mut self) -> Result<IndexOutcome, IndexError> {
        let start = Instant::now();
        let reporter = self.reporter();
        let mut outcome = IndexOutcome::new();

        // Everything that can fail for the whole pass happens before the
        // old entries are dropped.
        let pool = self.thread_pool()?;
        let files = self.discover(&mut outcome, &reporter)?;
        log::info!("Building index of {:?} ({} files)", self.root, files.len());
        self.entries.clear();
        reporter.report_start(&self.root, PassMode::Build, outcome.total_files);

        let counters = PassCounters::new(outcome.total_files);
        let results = self.run_pass(
            &pool,
            &files,
            |key, path| {
                self.index_file(key, path, &counters)?;
                Ok(EntryStatus::Inserted)
            },
            &counters,
            &reporter,
        );

        self.tally(results, &mut outcome, &reporter);
        outcome.bytes_fingerprinted = counters.bytes.load(Ordering::Relaxed);
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        reporter.report_done(&outcome);
        log::info!(
            "Indexed {} files under {:?} in {}ms ({} errors)",
            outcome.inserted,
            self.root,
            outcome.duration_ms,
            outcome.error_count()
        );
        Ok(outcome)
    }

    /// Re-fingerprint new and stale files, drop entries whose file is gone.
    ///
    /// A file is stale when its entry was not computed strictly after the
    /// file's last modification. Fresh files are not reopened. If a stale
    /// file fails to fingerprint, its old entry no longer describes the file
    /// and is dropped; it counts as removed and the error is reported.
    pub fn update(&mut self) -> Result<IndexOutcome, IndexError> {
        let start = Instant::now();
        let reporter = self.reporter();
        let mut outcome = IndexOutcome::new();

        let pool = self.thread_pool()?;
        let expected: HashSet<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let files = self.discover(&mut outcome, &reporter)?;
        log::info!(
            "Updating index of {:?} ({} files, {} indexed)",
            self.root,
            files.len(),
            expected.len()
        );
        reporter.report_start(&self.root, PassMode::Update, outcome.total_files);

        let counters = PassCounters::new(outcome.total_files);
        let results = self.run_pass(
            &pool,
            &files,
            |key, path| self.refresh_file(key, path, &counters),
            &counters,
            &reporter,
        );
        self.tally(results, &mut outcome, &reporter);

        let seen: HashSet<&str> = files.iter().map(|(key, _)| key.as_str()).collect();
        let mut removed = Vec::new();
        for key in expected {
            if !seen.contains(key.as_str()) {
                if self.entries.remove(&key).is_some() {
                    log::debug!("Removed orphan entry {}", key);
                    removed.push(key);
                }
            } else if !self.entries.contains_key(&key) {
                removed.push(key);
            }
        }
        removed.sort();
        for key in removed {
            outcome.record(EntryStatus::Removed);
            outcome.removed_paths.push(key);
        }

        outcome.bytes_fingerprinted = counters.bytes.load(Ordering::Relaxed);
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        reporter.report_done(&outcome);
        log::info!(
            "Updated index of {:?}: {} inserted, {} refreshed, {} removed, {} unchanged in {}ms",
            self.root,
            outcome.inserted,
            outcome.refreshed,
            outcome.removed,
            outcome.unchanged,
            outcome.duration_ms
        );
        Ok(outcome)
    }

    fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.config.show_progress, self.config.progress_interval_ms)
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool, IndexError> {
        self.config
            .thread_pool()
            .map_err(|e| IndexError::new(IndexErrorKind::Io, None, e.to_string()))
    }

    /// Walk the root directory by directory and pair every file with its key.
    ///
    /// Walk failures abort the pass; a path with no usable key is recorded
    /// as a per-file error.
    fn discover(
        &self,
        outcome: &mut IndexOutcome,
        reporter: &ProgressReporter,
    ) -> Result<Vec<(String, PathBuf)>, IndexError> {
        if !self.root.is_dir() {
            return Err(IndexError::not_found(self.root.clone()));
        }

        let follow_links = self.config.follow_links;
        let mut files = Vec::new();
        for dir in enumerate_directories(&self.root, follow_links) {
            for path in list_files(&dir?, follow_links)? {
                outcome.total_files += 1;
                match relative_key(&self.root, &path) {
                    Ok(key) => files.push((key, path)),
                    Err(e) => {
                        log::warn!("Skipping {:?}: {}", path, e.message);
                        outcome.errors.push(e);
                    }
                }
            }
            reporter.report_progress(IndexPhase::Walk, outcome.total_files, 0, 0);
        }
        Ok(files)
    }

    /// Run `visit` for every file on `pool`, in no particular order
    fn run_pass<V>(
        &self,
        pool: &rayon::ThreadPool,
        files: &[(String, PathBuf)],
        visit: V,
        counters: &PassCounters,
        reporter: &ProgressReporter,
    ) -> Vec<Result<EntryStatus, IndexError>>
    where
        V: Fn(&str, &Path) -> Result<EntryStatus, IndexError> + Sync,
    {
        pool.install(|| {
            files
                .par_iter()
                .map(|(key, path)| {
                    let result = visit(key, path);
                    let completed = counters.completed.fetch_add(1, Ordering::Relaxed) + 1;
                    reporter.report_progress(
                        IndexPhase::Fingerprint,
                        completed,
                        counters.total,
                        counters.bytes.load(Ordering::Relaxed),
                    );
                    result
                })
                .collect()
        })
    }

    fn tally(
        &self,
        results: Vec<Result<EntryStatus, IndexError>>,
        outcome: &mut IndexOutcome,
        reporter: &ProgressReporter,
    ) {
        for result in results {
            match result {
                Ok(status) => outcome.record(status),
                Err(e) => {
                    log::warn!("Failed to index {:?}: {}", e.path, e.message);
                    reporter.report_error(&e);
                    outcome.errors.push(e);
                }
            }
        }
    }

    /// Fingerprint one file and replace its entry.
    ///
    /// The entry is stamped before the file is opened, so a write that
    /// lands while hashing leaves the entry stale.
    fn index_file(&self, key: &str, path: &Path, counters: &PassCounters) -> Result<(), IndexError> {
        let indexed_at = Utc::now();
        let mut file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);

        let fingerprint = self
            .fingerprinter
            .fingerprint(&mut file)
            .map_err(|e| IndexError::fingerprint(path.to_path_buf(), e.to_string()))?;
        counters.bytes.fetch_add(len, Ordering::Relaxed);

        log::debug!("Indexed {}", key);
        self.entries.insert(
            key.to_string(),
            IndexedEntry::stamped(key.to_string(), fingerprint, indexed_at),
        );
        Ok(())
    }

    /// Recompute the entry for `key` only if it is missing or stale.
    ///
    /// An existing entry that cannot be checked or recomputed is dropped.
    fn refresh_file(
        &self,
        key: &str,
        path: &Path,
        counters: &PassCounters,
    ) -> Result<EntryStatus, IndexError> {
        if !self.entries.contains_key(key) {
            self.index_file(key, path, counters)?;
            return Ok(EntryStatus::Inserted);
        }

        let result = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| IndexError::io(path, e))
            .and_then(|modified| {
                // The map guard is dropped before index_file inserts into
                // the same shard.
                let fresh = self
                    .entries
                    .get(key)
                    .is_some_and(|e| e.is_fresh(DateTime::<Utc>::from(modified)));
                if fresh {
                    return Ok(EntryStatus::Unchanged);
                }
                self.index_file(key, path, counters)?;
                Ok(EntryStatus::Refreshed)
            });

        if result.is_err() {
            log::debug!("Dropped stale entry {}", key);
            self.entries.remove(key);
        }
        result
    }
}

impl PassCounters {
    fn new(total: u64) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }
}

impl<H: Fingerprinter> std::fmt::Debug for FileIndex<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndex")
            .field("root", &self.root)
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Md5Fingerprinter;
    use filetime::FileTime;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::io::{self, Read};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Write a file and backdate its mtime so freshness never depends on
    /// filesystem timestamp granularity.
    fn write_file(root: &Path, key: &str, contents: &[u8]) -> PathBuf {
        let path = resolve_key(root, key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        let past = SystemTime::now() - Duration::from_secs(60);
        filetime::set_file_mtime(&path, FileTime::from_system_time(past)).unwrap();
        path
    }

    /// Rewrite a file and push its mtime past any existing index timestamp
    fn touch_file(root: &Path, key: &str, contents: &[u8]) {
        let path = resolve_key(root, key);
        fs::write(&path, contents).unwrap();
        let future = SystemTime::now() + Duration::from_secs(60);
        filetime::set_file_mtime(&path, FileTime::from_system_time(future)).unwrap();
    }

    fn sample_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.txt", b"alpha");
        write_file(tmp.path(), "b.txt", b"bravo");
        write_file(tmp.path(), "nested/c.txt", b"charlie");
        write_file(tmp.path(), "nested/deeper/d.txt", b"delta");
        tmp
    }

    fn rejects_corrupt(file: &mut File) -> io::Result<String> {
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        if buf == b"corrupt" {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt content"));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    #[test]
    fn test_build_indexes_every_file() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);

        let outcome = index.build().unwrap();
        assert_eq!(outcome.total_files, 4);
        assert_eq!(outcome.inserted, 4);
        assert!(outcome.is_success());
        assert_eq!(outcome.bytes_fingerprinted, 5 + 5 + 7 + 5);
        assert_eq!(
            index.keys(),
            vec!["a.txt", "b.txt", "nested/c.txt", "nested/deeper/d.txt"]
        );
        assert!(!index.contains_key("nested"));

        let entry = index.get("a.txt").unwrap();
        assert_eq!(entry.relative_path, "a.txt");
        assert_eq!(entry.fingerprint, "2c1743a391305fbf367df8e4f069f9f9");
    }

    #[test]
    fn test_build_missing_root() {
        let tmp = TempDir::new().unwrap();
        let mut index = FileIndex::new(tmp.path().join("nope"), Md5Fingerprinter);
        let err = index.build().unwrap_err();
        assert_eq!(err.kind, IndexErrorKind::NotFound);
    }

    #[test]
    fn test_update_is_idempotent() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
        index.build().unwrap();

        assert_eq!(index.update().unwrap().changes(), 0);
        let second = index.update().unwrap();
        assert_eq!(second.changes(), 0);
        assert_eq!(second.unchanged, 4);
        assert_eq!(second.bytes_fingerprinted, 0);
    }

    #[test]
    fn test_update_refreshes_only_stale_file() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
        index.build().unwrap();
        let before: Vec<_> = index.keys().iter().map(|k| index.get(k).unwrap()).collect();

        touch_file(tmp.path(), "nested/c.txt", b"changed");
        let outcome = index.update().unwrap();
        assert_eq!(outcome.changes(), 1);
        assert_eq!(outcome.refreshed, 1);

        for old in before {
            let new = index.get(&old.relative_path).unwrap();
            if old.relative_path == "nested/c.txt" {
                assert_ne!(new.fingerprint, old.fingerprint);
            } else {
                assert_eq!(new, old);
            }
        }
    }

    #[test]
    fn test_update_removes_deleted_file() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
        index.build().unwrap();

        fs::remove_file(tmp.path().join("b.txt")).unwrap();
        let outcome = index.update().unwrap();
        assert_eq!(outcome.changes(), 1);
        assert_eq!(outcome.removed_paths, vec!["b.txt".to_string()]);
        assert!(!index.contains_key("b.txt"));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_update_adds_new_files() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
        index.build().unwrap();

        for i in 0..5 {
            write_file(tmp.path(), &format!("new/file{}.bin", i), b"fresh");
        }
        let outcome = index.update().unwrap();
        assert_eq!(outcome.changes(), 5);
        assert_eq!(outcome.inserted, 5);
        assert_eq!(index.len(), 9);
    }

    #[test]
    fn test_update_on_empty_index_inserts_everything() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
        let outcome = index.update().unwrap();
        assert_eq!(outcome.inserted, 4);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_fingerprint_failure_is_isolated() {
        let tmp = sample_tree();
        write_file(tmp.path(), "broken.bin", b"corrupt");

        let mut index = FileIndex::new(tmp.path(), rejects_corrupt);
        let outcome = index.build().unwrap();
        assert_eq!(outcome.total_files, 5);
        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(outcome.errors[0].kind, IndexErrorKind::Fingerprint);
        assert!(!index.contains_key("broken.bin"));
        assert_eq!(index.fingerprint_of("a.txt").as_deref(), Some("alpha"));
    }

    #[test]
    fn test_failed_refresh_drops_stale_entry() {
        let tmp = sample_tree();
        let mut index = FileIndex::new(tmp.path(), rejects_corrupt);
        index.build().unwrap();

        touch_file(tmp.path(), "a.txt", b"corrupt");
        let outcome = index.update().unwrap();
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(outcome.errors[0].kind, IndexErrorKind::Fingerprint);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.removed_paths, vec!["a.txt".to_string()]);
        assert!(!index.contains_key("a.txt"));
        assert_eq!(index.len(), 3);

        touch_file(tmp.path(), "a.txt", b"repaired");
        assert_eq!(index.update().unwrap().inserted, 1);
        assert_eq!(index.fingerprint_of("a.txt").as_deref(), Some("repaired"));
    }

    #[test]
    fn test_entry_is_stamped_before_fingerprinting() {
        let tmp = sample_tree();
        let finished_at = |_: &mut File| -> io::Result<DateTime<Utc>> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Utc::now())
        };
        let mut index = FileIndex::new(tmp.path(), finished_at);
        index.build().unwrap();

        for key in index.keys() {
            let entry = index.get(&key).unwrap();
            assert!(entry.indexed_at < entry.fingerprint, "{key}");
        }
    }

    #[test]
    fn test_failed_build_keeps_previous_entries() {
        let tmp = TempDir::new().unwrap();
        let tree = tmp.path().join("tree");
        write_file(&tree, "a.txt", b"alpha");
        let mut index = FileIndex::new(&tree, Md5Fingerprinter);
        index.build().unwrap();

        fs::remove_dir_all(&tree).unwrap();
        assert_eq!(index.build().unwrap_err().kind, IndexErrorKind::NotFound);
        assert_eq!(index.keys(), vec!["a.txt"]);
    }

    #[test]
    fn test_build_with_single_thread() {
        let tmp = sample_tree();
        let config = IndexConfig::builder().num_threads(1).show_progress(true).build();
        let mut index = FileIndex::with_config(tmp.path(), Md5Fingerprinter, config);
        assert_eq!(index.build().unwrap().inserted, 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_build_key_set_matches_tree(
            names in prop::collection::btree_set("[a-z]{1,8}(/[a-z]{1,8}){0,2}", 1..24),
        ) {
            let tmp = TempDir::new().unwrap();
            let mut expected = BTreeSet::new();
            for name in &names {
                let key = format!("{}.f", name);
                write_file(tmp.path(), &key, name.as_bytes());
                expected.insert(key);
            }

            let mut index = FileIndex::new(tmp.path(), Md5Fingerprinter);
            let outcome = index.build().unwrap();
            let keys: BTreeSet<String> = index.keys().into_iter().collect();
            prop_assert_eq!(outcome.inserted as usize, expected.len());
            prop_assert_eq!(keys, expected);
        }

        #[test]
        fn prop_completion_order_does_not_matter(
            delays in prop::collection::vec(0u64..8, 1..32),
        ) {
            let tmp = TempDir::new().unwrap();
            for (i, delay) in delays.iter().enumerate() {
                write_file(tmp.path(), &format!("f{}", i), &[*delay as u8]);
            }

            let sleepy = |file: &mut File| -> io::Result<u8> {
                let mut byte = [0u8; 1];
                file.read_exact(&mut byte)?;
                std::thread::sleep(Duration::from_millis(byte[0] as u64));
                Ok(byte[0])
            };
            let config = IndexConfig::builder().num_threads(8).build();
            let mut index = FileIndex::with_config(tmp.path(), sleepy, config);
            index.build().unwrap();

            prop_assert_eq!(index.len(), delays.len());
            for (i, delay) in delays.iter().enumerate() {
                prop_assert_eq!(index.fingerprint_of(&format!("f{}", i)), Some(*delay as u8));
            }
        }
    }
}
