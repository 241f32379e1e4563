//! Reporter trait for dependency injection
//!
//! Core pipelines report progress through this trait so they are not
//! coupled to a terminal. Every method has a no-op default so a reporter
//! only implements what it displays.

use glix_schema::BatchCounts;

pub trait Reporter: Send + Sync {
    /// A new phase has started (e.g. "Downloading").
    fn section(&self, _title: &str) {}

    /// Byte progress of one download.
    fn downloading(&self, _name: &str, _current: u64, _total: Option<u64>) {}

    /// An archive is being expanded.
    fn extracting(&self, _name: &str) {}

    /// One item finished successfully.
    fn done(&self, _name: &str, _detail: &str) {}

    /// One item failed.
    fn failed(&self, _name: &str, _reason: &str) {}

    /// Log an informational message.
    fn info(&self, _msg: &str) {}

    /// Log a warning message.
    fn warning(&self, _msg: &str) {}

    /// Per-item counts for a finished batch.
    fn summary(&self, _action: &str, _counts: BatchCounts) {}
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        (**self).downloading(name, current, total);
    }
    fn extracting(&self, name: &str) {
        (**self).extracting(name);
    }
    fn done(&self, name: &str, detail: &str) {
        (**self).done(name, detail);
    }
    fn failed(&self, name: &str, reason: &str) {
        (**self).failed(name, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, action: &str, counts: BatchCounts) {
        (**self).summary(action, counts);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {}
