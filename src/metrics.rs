//! Metrics and observability for seatable-mysync.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for sync operations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total tasks attempted
    pub tasks_total: AtomicU64,
    /// Successful tasks
    pub tasks_success: AtomicU64,
    /// Failed tasks
    pub tasks_failed: AtomicU64,
    /// Rows deleted while clearing destination tables
    pub rows_deleted: AtomicU64,
    /// Clearing rounds executed
    pub clear_rounds: AtomicU64,
    /// Rows loaded into destination tables
    pub rows_loaded: AtomicU64,
    /// SQL queries executed
    pub sql_queries: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed task.
    pub fn record_task(&self, success: bool) {
        self.tasks_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.tasks_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finished clearing run.
    pub fn record_clear(&self, rounds: u64, rows_deleted: u64) {
        self.clear_rounds.fetch_add(rounds, Ordering::Relaxed);
        self.rows_deleted.fetch_add(rows_deleted, Ordering::Relaxed);
    }

    /// Record rows loaded into a destination table.
    pub fn record_rows_loaded(&self, rows: u64) {
        self.rows_loaded.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record an executed SQL query.
    pub fn record_sql_query(&self) {
        self.sql_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_total: self.tasks_total.load(Ordering::Relaxed),
            tasks_success: self.tasks_success.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            clear_rounds: self.clear_rounds.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
            sql_queries: self.sql_queries.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.tasks_total.store(0, Ordering::Relaxed);
        self.tasks_success.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.rows_deleted.store(0, Ordering::Relaxed);
        self.clear_rounds.store(0, Ordering::Relaxed);
        self.rows_loaded.store(0, Ordering::Relaxed);
        self.sql_queries.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total tasks attempted
    pub tasks_total: u64,
    /// Successful tasks
    pub tasks_success: u64,
    /// Failed tasks
    pub tasks_failed: u64,
    /// Rows deleted while clearing destination tables
    pub rows_deleted: u64,
    /// Clearing rounds executed
    pub clear_rounds: u64,
    /// Rows loaded into destination tables
    pub rows_loaded: u64,
    /// SQL queries executed
    pub sql_queries: u64,
}

impl MetricsSnapshot {
    /// Calculate the task success rate.
    pub fn success_rate(&self) -> f64 {
        if self.tasks_total == 0 {
            0.0
        } else {
            self.tasks_success as f64 / self.tasks_total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_task(true);
        metrics.record_task(false);
        metrics.record_clear(2, 350);
        metrics.record_rows_loaded(120);
        metrics.record_sql_query();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_total, 2);
        assert_eq!(snapshot.tasks_success, 1);
        assert_eq!(snapshot.tasks_failed, 1);
        assert_eq!(snapshot.rows_deleted, 350);
        assert_eq!(snapshot.clear_rounds, 2);
        assert_eq!(snapshot.rows_loaded, 120);
        assert_eq!(snapshot.sql_queries, 1);
        assert!((snapshot.success_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();
        metrics.record_task(true);
        metrics.reset();
        assert_eq!(metrics.snapshot().tasks_total, 0);
    }
}
