use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide operational counters (spec §6, §9 "Global state"). Plain
/// monotonic atomics — exact consistency with persisted counts is not
/// required, only forward progress.
pub struct Metrics {
    started_at: Instant,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    files_deduplicated: AtomicU64,
    indicators_found: AtomicU64,
}

/// Point-in-time snapshot rendered by the ops endpoint.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub files_deduplicated: u64,
    pub indicators_found: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            files_deduplicated: AtomicU64::new(0),
            indicators_found: AtomicU64::new(0),
        }
    }

    pub fn increment_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deduplicated(&self) {
        self.files_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_indicators_found(&self, count: u64) {
        if count > 0 {
            self.indicators_found.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            files_deduplicated: self.files_deduplicated.load(Ordering::Relaxed),
            indicators_found: self.indicators_found.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
