//! Progress reporting module for index passes
//!
//! This module provides data structures and utilities for reporting
//! build/update progress to external callers via stderr, one JSON object
//! per line.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::IndexError;
use crate::models::IndexOutcome;

/// Which kind of pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassMode {
    /// Full build, every file fingerprinted
    Build,
    /// Incremental update, stale files only
    Update,
}

/// Pass phase indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    /// Walking the tree and discovering files
    #[default]
    Walk,
    /// Fingerprinting discovered files
    Fingerprint,
}

impl IndexPhase {
    /// Get string representation of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexPhase::Walk => "walk",
            IndexPhase::Fingerprint => "fingerprint",
        }
    }
}

/// Start message sent once the walk has found every file
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Index root
    pub root: String,
    /// Build or update
    pub mode: PassMode,
    /// Number of files discovered
    pub files: u64,
}

impl StartMessage {
    /// Create a new start message
    pub fn new(seq: u64, ts: u64, root: String, mode: PassMode, files: u64) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
            mode,
            files,
        }
    }
}

/// Progress message sent while the tree is walked or files complete
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Current phase
    pub phase: IndexPhase,
    /// Files found (walk) or fingerprinted (fingerprint) so far
    #[serde(rename = "f")]
    pub completed: u64,
    /// Files discovered in total, 0 while still walking
    #[serde(rename = "n")]
    pub total: u64,
    /// Bytes fingerprinted so far
    #[serde(rename = "b")]
    pub bytes: u64,
}

impl ProgressMessage {
    /// Create a new progress message
    pub fn new(seq: u64, ts: u64, phase: IndexPhase, completed: u64, total: u64, bytes: u64) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            phase,
            completed,
            total,
            bytes,
        }
    }
}

/// Error message sent when a single file fails
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Error type/category
    pub error_type: String,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorProgressMessage {
    /// Create a new error progress message
    pub fn new(
        seq: u64,
        ts: u64,
        error_type: String,
        message: String,
        path: Option<String>,
    ) -> Self {
        Self {
            msg_type: "err",
            seq,
            ts,
            error_type,
            message,
            path,
        }
    }
}

/// Done message sent when a pass completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Total number of files discovered
    #[serde(rename = "tf")]
    pub total_files: u64,
    /// Number of entries inserted
    #[serde(rename = "in")]
    pub inserted: u64,
    /// Number of entries refreshed
    #[serde(rename = "rf")]
    pub refreshed: u64,
    /// Number of entries removed
    #[serde(rename = "rm")]
    pub removed: u64,
    /// Number of errors encountered
    #[serde(rename = "ec")]
    pub error_count: usize,
    /// Bytes fingerprinted
    #[serde(rename = "b")]
    pub bytes: u64,
    /// Total pass duration in milliseconds
    pub ms: u64,
}

impl DoneMessage {
    /// Create a done message from a finished outcome
    pub fn from_outcome(seq: u64, ts: u64, outcome: &IndexOutcome) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            total_files: outcome.total_files,
            inserted: outcome.inserted,
            refreshed: outcome.refreshed,
            removed: outcome.removed,
            error_count: outcome.error_count(),
            bytes: outcome.bytes_fingerprinted,
            ms: outcome.duration_ms,
        }
    }
}

/// Progress reporter for outputting pass progress to stderr
///
/// Shared by every fingerprinting worker, so all of its state is atomic.
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last report time, in milliseconds since `start_time`
    last_report_ms: AtomicU64,
    /// Sequence number for messages
    seq: AtomicU64,
    /// Start time of the reporter
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report_ms: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Claim the next progress slot if the interval has elapsed.
    ///
    /// Only one of several racing workers wins a given slot.
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let now = self.current_timestamp();
        let last = self.last_report_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.interval_ms {
            return false;
        }
        self.last_report_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Report pass start
    pub fn report_start(&self, root: &Path, mode: PassMode, files: u64) {
        if !self.enabled {
            return;
        }

        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            root.to_string_lossy().to_string(),
            mode,
            files,
        );
        self.output_to_stderr(&msg);
    }

    /// Report walk or fingerprinting progress
    ///
    /// Returns true if a message was actually sent (respects interval timing).
    pub fn report_progress(
        &self,
        phase: IndexPhase,
        completed: u64,
        total: u64,
        bytes: u64,
    ) -> bool {
        if !self.should_report() {
            return false;
        }

        let msg = ProgressMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            phase,
            completed,
            total,
            bytes,
        );
        self.output_to_stderr(&msg);
        true
    }

    /// Report a per-file error
    ///
    /// Outputs an ErrorProgressMessage immediately (ignores interval timing).
    pub fn report_error(&self, error: &IndexError) {
        if !self.enabled {
            return;
        }

        let msg = ErrorProgressMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            format!("{:?}", error.kind),
            error.message.clone(),
            error.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        );
        self.output_to_stderr(&msg);
    }

    /// Report pass completion
    pub fn report_done(&self, outcome: &IndexOutcome) {
        if !self.enabled {
            return;
        }

        let msg = DoneMessage::from_outcome(self.next_seq(), self.current_timestamp(), outcome);
        self.output_to_stderr(&msg);
    }
}
