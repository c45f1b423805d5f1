//! Run-wide progress and failure accounting.
//!
//! A single [`Reporting`] handle is shared (behind an `Arc`) by every worker
//! in a run. Each counter is an independent atomic, so increments from
//! concurrent packages never lose updates. Counters only grow during a run;
//! [`Reporting::reset`] is the explicit way to start over.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Shared counters for one run.
#[derive(Debug, Default)]
pub struct Reporting {
    total_files: AtomicU64,
    total_skipped: AtomicU64,
    total_failed: AtomicU64,
    total_bytes: AtomicU64,
    max_file_size: AtomicU64,
}

impl Reporting {
    /// Create a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one file (or attachment) seen.
    pub fn add_file(&self) {
        self.total_files.fetch_add(1, Ordering::SeqCst);
    }

    /// Count one file skipped by policy or because it already exists.
    pub fn add_skip(&self) {
        self.total_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Count one file that could not be produced.
    pub fn add_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Add the size of a completed file and track the largest one.
    pub fn add_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.max_file_size.fetch_max(bytes, Ordering::SeqCst);
    }

    pub fn total_files(&self) -> u64 {
        self.total_files.load(Ordering::SeqCst)
    }

    pub fn total_skipped(&self) -> u64 {
        self.total_skipped.load(Ordering::SeqCst)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size.load(Ordering::SeqCst)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_files.store(0, Ordering::SeqCst);
        self.total_skipped.store(0, Ordering::SeqCst);
        self.total_failed.store(0, Ordering::SeqCst);
        self.total_bytes.store(0, Ordering::SeqCst);
        self.max_file_size.store(0, Ordering::SeqCst);
    }

    /// Capture the current values.
    ///
    /// Each counter is read independently; take the snapshot after all
    /// submitted work has completed for consistent totals.
    pub fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot {
            total_files: self.total_files(),
            total_skipped: self.total_skipped(),
            total_failed: self.total_failed(),
            total_bytes: self.total_bytes(),
            max_file_size: self.max_file_size(),
        }
    }
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSnapshot {
    pub total_files: u64,
    pub total_skipped: u64,
    pub total_failed: u64,
    pub total_bytes: u64,
    pub max_file_size: u64,
}

impl ReportSnapshot {
    /// Files that were neither skipped nor failed.
    pub fn total_succeeded(&self) -> u64 {
        self.total_files
            .saturating_sub(self.total_skipped + self.total_failed)
    }

    /// Render the end-of-run summary block.
    pub fn summary(&self) -> String {
        format!(
            "
================================
= ssdownloader summary         =
================================
= total files       : {}
= total succeeded   : {}
= total skipped     : {}
= total failed      : {}
= total bytes       : {}
= max bytes         : {}
================================",
            self.total_files,
            self.total_succeeded(),
            self.total_skipped,
            self.total_failed,
            human(self.total_bytes),
            human(self.max_file_size),
        )
    }
}

/// List the files whose size did not match the service's metadata.
///
/// Returns an empty string when there is nothing to report.
pub fn invalid_files_report(invalid_files: &[PathBuf]) -> String {
    if invalid_files.is_empty() {
        return String::new();
    }
    let mut report = String::from(
        "
the following files failed validation
-------------------------------------
",
    );
    for file in invalid_files {
        report.push_str(&format!("* {}\n", file.display()));
    }
    report
}

/// Format a byte count with a binary unit suffix.
pub fn human(bytes: u64) -> String {
    if bytes > GB {
        format!("{:.2} gb", bytes as f64 / GB as f64)
    } else if bytes > MB {
        format!("{:.2} mb", bytes as f64 / MB as f64)
    } else if bytes > KB {
        format!("{:.2} kb", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
