//! Host metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Host metrics.
#[derive(Debug)]
pub struct HostMetrics {
    /// Event loop iterations.
    pub iterations: AtomicU64,

    /// Deferred callbacks run.
    pub deferred_run: AtomicU64,

    /// Tick callbacks run.
    pub ticks_run: AtomicU64,

    /// Background jobs scheduled.
    pub jobs_scheduled: AtomicU64,

    /// Background jobs whose body completed.
    pub jobs_completed: AtomicU64,

    /// Background jobs cancelled before their body started.
    pub jobs_cancelled: AtomicU64,

    /// Background jobs whose body panicked.
    pub jobs_failed: AtomicU64,

    /// Handle closes completed.
    pub handles_closed: AtomicU64,

    /// Cleanup hooks invoked.
    pub hooks_run: AtomicU64,

    /// Deepest async context stack seen.
    pub max_stack_depth: AtomicU64,

    start_time: Instant,
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetrics {
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            deferred_run: AtomicU64::new(0),
            ticks_run: AtomicU64::new(0),
            jobs_scheduled: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_cancelled: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            handles_closed: AtomicU64::new(0),
            hooks_run: AtomicU64::new(0),
            max_stack_depth: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deferred_run(&self) {
        self.deferred_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_run(&self) {
        self.ticks_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_scheduled(&self) {
        self.jobs_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handle_closed(&self) {
        self.handles_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hooks_run(&self, count: u64) {
        self.hooks_run.fetch_add(count, Ordering::Relaxed);
    }

    /// Record the current stack depth, keeping the maximum.
    pub fn record_stack_depth(&self, depth: usize) {
        self.max_stack_depth
            .fetch_max(depth as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_secs: self.uptime_secs(),
            iterations: self.iterations.load(Ordering::Relaxed),
            deferred_run: self.deferred_run.load(Ordering::Relaxed),
            ticks_run: self.ticks_run.load(Ordering::Relaxed),
            jobs_scheduled: self.jobs_scheduled.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            handles_closed: self.handles_closed.load(Ordering::Relaxed),
            hooks_run: self.hooks_run.load(Ordering::Relaxed),
            max_stack_depth: self.max_stack_depth.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: f64,
    pub iterations: u64,
    pub deferred_run: u64,
    pub ticks_run: u64,
    pub jobs_scheduled: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub jobs_failed: u64,
    pub handles_closed: u64,
    pub hooks_run: u64,
    pub max_stack_depth: u64,
}

impl MetricsSnapshot {
    /// Jobs whose completion has run, whatever the outcome.
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_completed + self.jobs_cancelled + self.jobs_failed
    }

    /// Fraction of finished jobs that were cancelled.
    pub fn cancel_ratio(&self) -> f64 {
        let finished = self.jobs_finished();
        if finished == 0 {
            return 0.0;
        }
        self.jobs_cancelled as f64 / finished as f64
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
