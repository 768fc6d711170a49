//! Executor utilization statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of executor activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Configured number of worker threads.
    pub thread_count: usize,
    /// Worker threads currently alive.
    pub live_workers: usize,
    /// Tasks waiting in the run queue.
    pub queued_tasks: usize,
    /// Non-empty batches submitted through either entry point.
    pub submitted_batches: u64,
    /// Batches that went through the run queue.
    pub parallel_batches: u64,
    /// Batches run in place on the submitting thread.
    pub sequential_batches: u64,
    /// Tasks executed, by workers or by submitters.
    pub executed_tasks: u64,
    /// Tasks whose run captured an error.
    pub failed_tasks: u64,
    /// Batches that returned a `BatchError`.
    pub failed_batches: u64,
}

/// Internal counters for executor statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct ExecutorCounters {
    pub submitted_batches: AtomicU64,
    pub parallel_batches: AtomicU64,
    pub sequential_batches: AtomicU64,
    pub executed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub failed_batches: AtomicU64,
}

impl ExecutorCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(
        &self,
        thread_count: usize,
        live_workers: usize,
        queued_tasks: usize,
    ) -> ExecutorStats {
        ExecutorStats {
            thread_count,
            live_workers,
            queued_tasks,
            submitted_batches: self.submitted_batches.load(Ordering::Relaxed),
            parallel_batches: self.parallel_batches.load(Ordering::Relaxed),
            sequential_batches: self.sequential_batches.load(Ordering::Relaxed),
            executed_tasks: self.executed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }

    pub fn record_executed(&self, failed: bool) {
        self.executed_tasks.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_tasks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = ExecutorStats::default();
        assert_eq!(stats.thread_count, 0);
        assert_eq!(stats.executed_tasks, 0);
        assert_eq!(stats.failed_batches, 0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = ExecutorCounters::default();
        counters.submitted_batches.fetch_add(3, Ordering::Relaxed);
        counters.record_executed(false);
        counters.record_executed(true);

        let stats = counters.snapshot(4, 2, 7);
        assert_eq!(stats.thread_count, 4);
        assert_eq!(stats.live_workers, 2);
        assert_eq!(stats.queued_tasks, 7);
        assert_eq!(stats.submitted_batches, 3);
        assert_eq!(stats.executed_tasks, 2);
        assert_eq!(stats.failed_tasks, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = ExecutorCounters::default().snapshot(2, 1, 0);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["thread_count"], 2);
        assert_eq!(json["live_workers"], 1);
    }
}
