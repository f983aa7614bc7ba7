//! Directory walker
//!
//! Traversal is delegated to walkdir, which keeps an explicit stack of open
//! directory handles, so arbitrarily deep trees never grow the call stack.

use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::IndexError;

fn walker(root: &Path, follow_links: bool) -> walkdir::IntoIter {
    WalkDir::new(root).follow_links(follow_links).into_iter()
}

/// Lazily yield `root` and every directory below it, each exactly once.
///
/// The first error (an inaccessible root included) is yielded and ends the
/// sequence.
pub fn enumerate_directories(
    root: &Path,
    follow_links: bool,
) -> impl Iterator<Item = Result<PathBuf, IndexError>> {
    let mut failed = false;
    walker(root, follow_links).filter_map(move |entry| {
        if failed {
            return None;
        }
        match entry {
            Ok(entry) if entry.file_type().is_dir() => Some(Ok(entry.into_path())),
            Ok(_) => None,
            Err(e) => {
                failed = true;
                Some(Err(IndexError::from(e)))
            }
        }
    })
}

/// Regular files directly inside `dir`, not descending into subdirectories.
///
/// Symlinks count as files only when `follow_links` is set and they point
/// at a regular file.
pub fn list_files(dir: &Path, follow_links: bool) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| IndexError::io(dir, e))? {
        let entry = entry.map_err(|e| IndexError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| IndexError::io(&path, e))?;
        let is_file = if file_type.is_symlink() {
            follow_links && fs::metadata(&path).is_ok_and(|m| m.is_file())
        } else {
            file_type.is_file()
        };
        if is_file {
            files.push(path);
        }
    }
    Ok(files)
}

/// Collect every regular file under `root`. Directories are never returned.
pub fn enumerate_files(root: &Path, follow_links: bool) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();
    for dir in enumerate_directories(root, follow_links) {
        files.extend(list_files(&dir?, follow_links)?);
    }
    Ok(files)
}

/// Key for `path` relative to `root`, components joined with `/`
pub fn relative_key(root: &Path, path: &Path) -> Result<String, IndexError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        IndexError::invalid_path(path.to_path_buf(), format!("not under {:?}", root))
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => {
                    return Err(IndexError::invalid_path(
                        path.to_path_buf(),
                        "path is not valid UTF-8",
                    ))
                }
            },
            Component::CurDir => {}
            _ => {
                return Err(IndexError::invalid_path(
                    path.to_path_buf(),
                    "unexpected path component",
                ))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Whether `key` names a path strictly below any root.
///
/// Every `/`-separated segment must be a single plain name, so keys that
/// are empty, absolute, or contain `.` or `..` segments are rejected.
pub fn is_contained_key(key: &str) -> bool {
    key.split('/').all(|segment| {
        let mut components = Path::new(segment).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    })
}

/// Resolve a key back to a path below `root`
pub fn resolve_key(root: &Path, key: &str) -> PathBuf {
    key.split('/').fold(root.to_path_buf(), |path, part| path.join(part))
}
