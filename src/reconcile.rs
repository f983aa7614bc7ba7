//! Master-driven reconciliation of two file indexes

use std::fs;
use std::path::Path;

use crate::error::IndexError;
use crate::fingerprint::Fingerprinter;
use crate::index::FileIndex;
use crate::models::{Discrepancy, ReconcileReport, RepairFailure};

/// Compare every master entry against `current`.
///
/// A path is a discrepancy when `current` has no entry for it or the
/// fingerprints differ. Paths that exist only in `current` are ignored.
/// With `repair`, each discrepancy is fixed by copying the master file over
/// the current one; a failed copy is recorded and the pass continues.
pub fn reconcile<A, B>(master: &FileIndex<A>, current: &FileIndex<B>, repair: bool) -> ReconcileReport
where
    A: Fingerprinter,
    B: Fingerprinter<Output = A::Output>,
{
    let mut report = ReconcileReport::default();

    for key in master.keys() {
        let Some(expected) = master.fingerprint_of(&key) else {
            continue;
        };
        let actual = current.fingerprint_of(&key);
        if actual.as_ref() == Some(&expected) {
            continue;
        }

        let discrepancy = Discrepancy {
            master_path: master.absolute_path(&key),
            current_path: current.absolute_path(&key),
            missing: actual.is_none(),
            relative_path: key,
        };
        log::warn!("{} NG", discrepancy.relative_path);
        log::warn!(
            "\t{} -> {}",
            discrepancy.master_path.display(),
            discrepancy.current_path.display()
        );

        if repair {
            match copy_over(&discrepancy.master_path, &discrepancy.current_path) {
                Ok(bytes) => {
                    log::info!("Repaired {} ({} bytes)", discrepancy.relative_path, bytes);
                    report.repaired += 1;
                }
                Err(error) => {
                    log::error!(
                        "Failed to repair {}: {}",
                        discrepancy.relative_path,
                        error.message
                    );
                    report.repair_failures.push(RepairFailure {
                        relative_path: discrepancy.relative_path.clone(),
                        message: error.message.clone(),
                        error,
                    });
                }
            }
        }

        report.discrepancies.push(discrepancy);
    }

    report
}

/// Copy `from` onto `to`, creating parent directories as needed
fn copy_over(from: &Path, to: &Path) -> Result<u64, IndexError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
    }
    fs::copy(from, to).map_err(|e| IndexError::io(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::error::IndexErrorKind;
    use crate::fingerprint::Md5Fingerprinter;
    use crate::models::IndexedEntry;
    use crate::snapshot::IndexSnapshot;
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn no_fingerprint(_: &mut File) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "not used"))
    }

    type Fixed = fn(&mut File) -> io::Result<String>;

    /// Index with hand-written fingerprints
    fn fixed_index(root: &Path, entries: &[(&str, &str)]) -> FileIndex<Fixed> {
        let snapshot = IndexSnapshot {
            root: root.to_path_buf(),
            entries: entries
                .iter()
                .map(|(key, hash)| {
                    (
                        key.to_string(),
                        IndexedEntry::new(key.to_string(), hash.to_string()),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        };
        FileIndex::from_snapshot(snapshot, no_fingerprint as Fixed, IndexConfig::default())
    }

    fn write(root: &Path, key: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reports_mismatched_fingerprint() {
        let master = fixed_index(Path::new("/master"), &[("a", "H1"), ("b", "H2")]);
        let current = fixed_index(Path::new("/current"), &[("a", "H1"), ("b", "H3")]);

        let report = reconcile(&master, &current, false);
        assert_eq!(report.count(), 1);
        let found = &report.discrepancies[0];
        assert_eq!(found.relative_path, "b");
        assert_eq!(found.master_path, PathBuf::from("/master/b"));
        assert_eq!(found.current_path, PathBuf::from("/current/b"));
        assert!(!found.missing);
        assert_eq!(report.repaired, 0);
    }

    #[test]
    fn test_ignores_current_only_paths() {
        let master = fixed_index(Path::new("/master"), &[("a", "H1")]);
        let current = fixed_index(Path::new("/current"), &[("a", "H1"), ("c", "H4")]);

        let report = reconcile(&master, &current, false);
        assert_eq!(report.count(), 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_reports_missing_path() {
        let master = fixed_index(Path::new("/master"), &[("a", "H1"), ("dir/b", "H2")]);
        let current = fixed_index(Path::new("/current"), &[("a", "H1")]);

        let report = reconcile(&master, &current, false);
        assert_eq!(report.count(), 1);
        assert!(report.discrepancies[0].missing);
        assert_eq!(report.discrepancies[0].current_path, PathBuf::from("/current/dir/b"));
    }

    #[test]
    fn test_repair_overwrites_and_creates() {
        let tmp = TempDir::new().unwrap();
        let master_root = tmp.path().join("master");
        let current_root = tmp.path().join("current");
        write(&master_root, "a", b"same");
        write(&master_root, "b", b"master copy");
        write(&master_root, "sub/c", b"only in master");
        write(&current_root, "a", b"same");
        write(&current_root, "b", b"drifted");
        write(&current_root, "extra", b"current only");

        let mut master = FileIndex::new(&master_root, Md5Fingerprinter);
        let mut current = FileIndex::new(&current_root, Md5Fingerprinter);
        master.build().unwrap();
        current.build().unwrap();

        let report = reconcile(&master, &current, true);
        assert_eq!(report.count(), 2);
        assert_eq!(report.repaired, 2);
        assert!(report.repair_failures.is_empty());
        assert_eq!(fs::read(current_root.join("b")).unwrap(), b"master copy");
        assert_eq!(fs::read(current_root.join("sub/c")).unwrap(), b"only in master");
        assert_eq!(fs::read(current_root.join("extra")).unwrap(), b"current only");

        let mut rebuilt = FileIndex::new(&current_root, Md5Fingerprinter);
        rebuilt.build().unwrap();
        assert!(reconcile(&master, &rebuilt, false).is_clean());
    }

    #[test]
    fn test_repair_failure_is_reported_per_path() {
        let tmp = TempDir::new().unwrap();
        let master_root = tmp.path().join("master");
        let current_root = tmp.path().join("current");
        write(&master_root, "good", b"fine");
        fs::create_dir_all(&current_root).unwrap();

        // "gone" is indexed in master but its file no longer exists
        let master = fixed_index(&master_root, &[("gone", "H1"), ("good", "H2")]);
        let current = fixed_index(&current_root, &[]);

        let report = reconcile(&master, &current, true);
        assert_eq!(report.count(), 2);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.repair_failures.len(), 1);
        assert_eq!(report.repair_failures[0].relative_path, "gone");
        assert_eq!(report.repair_failures[0].error.kind, IndexErrorKind::NotFound);
        assert_eq!(fs::read(current_root.join("good")).unwrap(), b"fine");
    }
}
