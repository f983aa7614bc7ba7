//! Error types for the file index

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while indexing, persisting or reconciling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexErrorKind {
    /// Snapshot file or root directory not found
    NotFound,
    /// Snapshot present but not a decodable document
    Parse,
    /// File could not be opened, read or copied
    Io,
    /// The fingerprint function failed on a file
    Fingerprint,
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// Path is not under the index root or has no UTF-8 form
    InvalidPath,
}

impl IndexErrorKind {
    /// Whether a cached index should be treated as absent and rebuilt
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, IndexErrorKind::NotFound | IndexErrorKind::Parse)
    }
}

/// Represents an error that occurred while working with an index
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct IndexError {
    /// The kind of error
    pub kind: IndexErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl IndexError {
    /// Create a new index error
    pub fn new(kind: IndexErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            IndexErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create a parse error for a snapshot
    pub fn parse(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::Parse, Some(path), message)
    }

    /// Create a fingerprint failure for a single file
    pub fn fingerprint(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::Fingerprint, Some(path), message)
    }

    /// Create an invalid path error
    pub fn invalid_path(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::InvalidPath, Some(path), message)
    }

    /// Wrap an I/O error and attach the path it happened on
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let mut error = Self::from(err);
        error.path = Some(path.into());
        error
    }

    /// Whether this error means a cached index is absent or unusable
    pub fn is_cache_miss(&self) -> bool {
        self.kind.is_cache_miss()
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => IndexErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => IndexErrorKind::NotFound,
            _ => IndexErrorKind::Io,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(IndexErrorKind::Parse, None, err.to_string())
    }
}

impl From<walkdir::Error> for IndexError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => IndexErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => IndexErrorKind::NotFound,
            _ => IndexErrorKind::Io,
        };
        Self::new(kind, path, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let err = IndexError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind, IndexErrorKind::NotFound);

        let err = IndexError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.kind, IndexErrorKind::PermissionDenied);
        assert_eq!(err.path, Some(PathBuf::from("/tmp/x")));

        let err = IndexError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(err.kind, IndexErrorKind::Io);
    }

    #[test]
    fn test_cache_miss_kinds() {
        assert!(IndexErrorKind::NotFound.is_cache_miss());
        assert!(IndexErrorKind::Parse.is_cache_miss());
        assert!(!IndexErrorKind::Io.is_cache_miss());
        assert!(!IndexErrorKind::Fingerprint.is_cache_miss());
    }

    #[test]
    fn test_json_error_is_parse() {
        let err: IndexError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert_eq!(err.kind, IndexErrorKind::Parse);
    }
}
