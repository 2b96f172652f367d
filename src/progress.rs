//! Progress reporting for a running batch.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

use crate::error::IndexError;

/// Implemented by whatever front end watches the indexer.
pub trait ProgressMonitor: Send + Sync {
    fn set_expected(&self, items: &[String]);

    fn mark_indexed(&self, item: &str);

    fn mark_stored(&self, item: &str);

    fn raise_error(&self, item: &str, cause: &IndexError);

    /// The candidate needed no indexing.
    fn mark_skipped(&self, _item: &str) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub expected: u64,
    pub indexed: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Logs every transition through `tracing` and counts them.
#[derive(Debug, Default)]
pub struct LogProgress {
    expected: AtomicU64,
    indexed: AtomicU64,
    stored: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    errors: Mutex<Vec<(String, String)>>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            expected: self.expected.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// `(item, message)` for every raised error, in arrival order.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().clone()
    }
}

impl ProgressMonitor for LogProgress {
    fn set_expected(&self, items: &[String]) {
        self.expected.fetch_add(items.len() as u64, Ordering::Relaxed);
        info!(count = items.len(), "candidates to index");
    }

    fn mark_indexed(&self, item: &str) {
        self.indexed.fetch_add(1, Ordering::Relaxed);
        info!(item, "indexed");
    }

    fn mark_stored(&self, item: &str) {
        let stored = self.stored.fetch_add(1, Ordering::Relaxed) + 1;
        let expected = self.expected.load(Ordering::Relaxed);
        info!(item, stored, expected, "stored");
    }

    fn raise_error(&self, item: &str, cause: &IndexError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        error!(item, error = %cause, retryable = cause.is_retryable(), "indexing failed");
        self.errors.lock().push((item.to_string(), cause.to_string()));
    }

    fn mark_skipped(&self, item: &str) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        info!(item, "skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_transitions() {
        let progress = LogProgress::new();
        progress.set_expected(&["a".into(), "b".into(), "c".into()]);
        progress.mark_indexed("a");
        progress.mark_stored("a");
        progress.mark_skipped("b");
        progress.raise_error("c", &IndexError::parse("bad magic"));

        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                expected: 3,
                indexed: 1,
                stored: 1,
                skipped: 1,
                failed: 1,
            }
        );
        let errors = progress.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "c");
        assert!(errors[0].1.contains("bad magic"));
    }
}
