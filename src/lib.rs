//! Content-fingerprint index of directory trees
//!
//! This library keeps a persisted, incrementally updated map from a tree's
//! relative file paths to content fingerprints, and reconciles a current
//! tree against a master tree to find and repair drifted files.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod snapshot;
pub mod validator;
pub mod walker;

pub use config::{IndexConfig, ValidatorConfig};
pub use error::{IndexError, IndexErrorKind};
pub use fingerprint::{Fingerprinter, Md5Fingerprinter};
pub use index::FileIndex;
pub use models::{
    Discrepancy, EntryStatus, IndexOutcome, IndexedEntry, ReconcileReport, RepairFailure,
};
pub use progress::{
    DoneMessage, ErrorProgressMessage, IndexPhase, PassMode, ProgressMessage, ProgressReporter,
    StartMessage,
};
pub use reconcile::reconcile;
pub use snapshot::IndexSnapshot;
pub use validator::{
    benchmark, index_path, load_current_index, load_master_index, reset_indexes, validate,
    BenchmarkSummary, IndexSource, LoadedIndex, ValidationSummary,
};
pub use walker::{enumerate_directories, enumerate_files, list_files};
