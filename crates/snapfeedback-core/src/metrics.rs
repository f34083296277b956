//! Process-wide counters.
//!
//! Increments are silent. [`Metrics::flush`] emits every counter as one
//! `info!` event; the daemon calls it on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    submissions_created: AtomicU64,
    evaluations_succeeded: AtomicU64,
    evaluations_failed: AtomicU64,
    suggestion_runs_stored: AtomicU64,
    suggestion_runs_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            submissions_created: AtomicU64::new(0),
            evaluations_succeeded: AtomicU64::new(0),
            evaluations_failed: AtomicU64::new(0),
            suggestion_runs_stored: AtomicU64::new(0),
            suggestion_runs_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_submissions(&self) {
        self.submissions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evaluations_succeeded(&self) {
        self.evaluations_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evaluations_failed(&self) {
        self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_suggestion_runs_stored(&self) {
        self.suggestion_runs_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_suggestion_runs_failed(&self) {
        self.suggestion_runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            submissions_created = self.submissions_created(),
            evaluations_succeeded = self.evaluations_succeeded(),
            evaluations_failed = self.evaluations_failed(),
            suggestion_runs_stored = self.suggestion_runs_stored(),
            suggestion_runs_failed = self.suggestion_runs_failed(),
        );
    }

    pub fn submissions_created(&self) -> u64 {
        self.submissions_created.load(Ordering::Relaxed)
    }

    pub fn evaluations_succeeded(&self) -> u64 {
        self.evaluations_succeeded.load(Ordering::Relaxed)
    }

    pub fn evaluations_failed(&self) -> u64 {
        self.evaluations_failed.load(Ordering::Relaxed)
    }

    pub fn suggestion_runs_stored(&self) -> u64 {
        self.suggestion_runs_stored.load(Ordering::Relaxed)
    }

    pub fn suggestion_runs_failed(&self) -> u64 {
        self.suggestion_runs_failed.load(Ordering::Relaxed)
    }
}
