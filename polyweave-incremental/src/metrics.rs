//! Work table metrics
//!
//! Counters for tracking how effective each memoization table is. A table's
//! metrics are shared by reference with every table forked from it, so the
//! counts describe a pipeline stage across generations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics for a single work table
#[derive(Debug)]
pub struct TableMetrics {
    /// Name of the table
    pub table_name: &'static str,

    /// Requests that joined an existing entry
    pub hit_count: AtomicU64,

    /// Requests that started a new computation
    pub miss_count: AtomicU64,

    /// Entries force-seeded without computation
    pub seeded_count: AtomicU64,

    /// Computations that completed with a failure
    pub failure_count: AtomicU64,

    /// Total time spent computing (nanoseconds)
    pub total_compute_time_ns: AtomicU64,

    /// Number of computations that ran to completion
    pub execution_count: AtomicU64,
}

impl TableMetrics {
    /// Create new metrics for a table
    pub fn new(table_name: &'static str) -> Self {
        TableMetrics {
            table_name,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            seeded_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_compute_time_ns: AtomicU64::new(0),
            execution_count: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seed(&self) {
        self.seeded_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished computation and whether it succeeded
    pub fn record_execution(&self, duration: Duration, succeeded: bool) {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
        self.total_compute_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if !succeeded {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.seeded_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_compute_time_ns.store(0, Ordering::Relaxed);
        self.execution_count.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            table_name: self.table_name,
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            seeded: self.seeded_count.load(Ordering::Relaxed),
            failures: self.failure_count.load(Ordering::Relaxed),
            executions: self.execution_count.load(Ordering::Relaxed),
            total_time_ns: self.total_compute_time_ns.load(Ordering::Relaxed),
        }
    }
}

impl Default for TableMetrics {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// A point-in-time snapshot of table metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub table_name: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub seeded: u64,
    pub failures: u64,
    pub executions: u64,
    pub total_time_ns: u64,
}

impl MetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn avg_execution_time(&self) -> Duration {
        if self.executions == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_time_ns / self.executions)
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Table: {}", self.table_name)?;
        writeln!(
            f,
            "  Hits: {} | Misses: {} | Hit Rate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Executions: {} | Failures: {} | Seeded: {}",
            self.executions, self.failures, self.seeded
        )?;
        writeln!(
            f,
            "  Avg Time: {:.2}ms | Total Time: {:.2}ms",
            self.avg_execution_time().as_secs_f64() * 1000.0,
            Duration::from_nanos(self.total_time_ns).as_secs_f64() * 1000.0
        )?;
        Ok(())
    }
}
