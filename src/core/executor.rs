//! The recursive executor: the public entry point for running batches.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;

use super::call_stack;
use super::error::{BatchError, SchedulerError};
use super::run_queue::RunQueue;
use super::signal::Signal;
use super::stats::{ExecutorCounters, ExecutorStats};
use super::task::{prepare_batch, Schedulable, Task, Work};
use super::worker_pool::WorkerPool;

/// State shared by the executor handle and its worker threads.
pub(crate) struct ExecutorInner {
    pub config: ExecutorConfig,
    pub queue: RunQueue<Arc<dyn Schedulable>>,
    pub signal: Signal,
    pub pool: WorkerPool,
    pub counters: ExecutorCounters,
}

impl ExecutorInner {
    fn run_task(&self, task: &dyn Schedulable) {
        let failed = task.run_scheduled(&self.signal);
        self.counters.record_executed(failed);
    }

    /// Run the deepest ready task of any batch, or wait up to the idle bound
    /// if none is ready. Returns whether a task ran.
    pub fn run_next_or_wait(&self) -> bool {
        self.run_next_or_wait_since(self.signal.generation())
    }

    /// Like [`run_next_or_wait`](Self::run_next_or_wait), but the wait is
    /// skipped if anything was signalled after generation `seen`.
    fn run_next_or_wait_since(&self, seen: u64) -> bool {
        if let Some(task) = self.queue.pop_deepest() {
            self.run_task(&*task);
            true
        } else {
            self.signal.wait_for(seen, self.config.idle_wait());
            false
        }
    }
}

/// Executes batches of independent tasks, any of which may submit and wait
/// for batches of its own.
///
/// Batches of a single task, and every batch when `thread_count` is zero,
/// run in place on the submitting thread. Larger batches go through a shared
/// run queue ordered by depth, drained by the worker threads and by every
/// submitter that is waiting for its own batch. Because a waiting submitter
/// keeps executing queued work, nested batches make progress with any pool
/// size, including a single worker.
///
/// Task failures are captured per task and reported to the submitter as one
/// [`BatchError`] after the whole batch has completed.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use recursive_executor::core::{RecursiveExecutor, Task};
///
/// let executor = Arc::new(RecursiveExecutor::with_thread_count(1));
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let root = {
///     let executor = Arc::clone(&executor);
///     let runs = Arc::clone(&runs);
///     Task::from_fn(move || {
///         runs.fetch_add(1, Ordering::SeqCst);
///         let children: Vec<_> = (0..5)
///             .map(|_| {
///                 let runs = Arc::clone(&runs);
///                 Task::from_fn(move || {
///                     runs.fetch_add(1, Ordering::SeqCst);
///                     Ok(())
///                 })
///             })
///             .collect();
///         executor.execute(&children)?;
///         Ok(())
///     })
/// };
///
/// executor.execute(&[root]).unwrap();
/// assert_eq!(runs.load(Ordering::SeqCst), 6);
/// ```
pub struct RecursiveExecutor {
    inner: Arc<ExecutorInner>,
}

impl RecursiveExecutor {
    /// Create an executor from a configuration.
    ///
    /// No thread is started until the first batch that needs workers.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if the configuration does not validate.
    pub fn new(config: ExecutorConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Create an executor with `thread_count` workers and default settings.
    #[must_use]
    pub fn with_thread_count(thread_count: usize) -> Self {
        Self::from_valid(ExecutorConfig::default().with_thread_count(thread_count))
    }

    /// Create an executor configured from the environment.
    ///
    /// # Errors
    ///
    /// See [`ExecutorConfig::from_env`].
    pub fn from_env() -> Result<Self, SchedulerError> {
        Self::new(ExecutorConfig::from_env()?)
    }

    fn from_valid(config: ExecutorConfig) -> Self {
        info!(
            thread_count = config.thread_count,
            idle_wait_ms = config.idle_wait_ms,
            "RecursiveExecutor initialized"
        );
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                queue: RunQueue::new(),
                signal: Signal::new(),
                pool: WorkerPool::new(),
                counters: ExecutorCounters::default(),
            }),
        }
    }

    /// Configured number of worker threads. The live number may briefly
    /// differ, e.g. right after [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.config.thread_count
    }

    /// The configuration this executor was built with.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Execute a batch and wait until every task of it has completed.
    ///
    /// An empty batch returns at once. A single task, or any batch when the
    /// executor has no worker threads, runs on the calling thread in the
    /// given order. Otherwise the batch is queued and the calling thread
    /// executes queued tasks (of any batch, deepest first) until its own
    /// batch is done.
    ///
    /// # Errors
    ///
    /// A [`BatchError`] listing every task of this batch whose run failed,
    /// in batch order. Sibling tasks always run regardless.
    ///
    /// # Panics
    ///
    /// Panics if a task of the batch is still queued or running from an
    /// earlier submission.
    pub fn execute<W: Work>(&self, tasks: &[Arc<Task<W>>]) -> Result<(), BatchError> {
        if tasks.is_empty() {
            return Ok(());
        }
        self.inner
            .counters
            .submitted_batches
            .fetch_add(1, Ordering::Relaxed);

        if tasks.len() == 1 || self.inner.config.thread_count == 0 {
            self.run_in_place(tasks);
        } else {
            WorkerPool::ensure_workers(&self.inner);
            self.run_in_parallel(tasks);
        }
        self.batch_result(tasks)
    }

    /// Execute a batch on the calling thread, in order, whatever the pool
    /// size. Suited to batches too cheap to be worth dispatching; nested
    /// batches submitted by these tasks still see the right depth.
    ///
    /// # Errors
    ///
    /// A [`BatchError`] listing every failed task, in batch order.
    ///
    /// # Panics
    ///
    /// Panics if a task of the batch is still queued or running from an
    /// earlier submission.
    pub fn execute_sequentially<W: Work>(&self, tasks: &[Arc<Task<W>>]) -> Result<(), BatchError> {
        if tasks.is_empty() {
            return Ok(());
        }
        self.inner
            .counters
            .submitted_batches
            .fetch_add(1, Ordering::Relaxed);
        self.run_in_place(tasks);
        self.batch_result(tasks)
    }

    fn run_in_place<W: Work>(&self, tasks: &[Arc<Task<W>>]) {
        prepare_batch(tasks, &call_stack::batch_origin());
        self.inner
            .counters
            .sequential_batches
            .fetch_add(1, Ordering::Relaxed);
        for task in tasks {
            self.inner.run_task(&**task);
        }
    }

    fn run_in_parallel<W: Work>(&self, tasks: &[Arc<Task<W>>]) {
        let origin = call_stack::batch_origin();
        prepare_batch(tasks, &origin);
        self.inner
            .counters
            .parallel_batches
            .fetch_add(1, Ordering::Relaxed);
        self.inner.queue.insert(
            origin.depth,
            tasks
                .iter()
                .map(|task| Arc::clone(task) as Arc<dyn Schedulable>),
        );
        self.inner.signal.notify_all();
        debug!(
            batch_size = tasks.len(),
            depth = origin.depth,
            label = %origin.label,
            "Batch enqueued"
        );

        // The generation is read before the completion check, so a task
        // completing in between wakes this thread instead of being slept
        // through.
        loop {
            let seen = self.inner.signal.generation();
            if tasks.iter().all(|task| task.is_completed()) {
                break;
            }
            self.inner.run_next_or_wait_since(seen);
        }
    }

    fn batch_result<W>(&self, tasks: &[Arc<Task<W>>]) -> Result<(), BatchError> {
        let failures = tasks
            .iter()
            .enumerate()
            .filter_map(|(index, task)| task.failure_at(index))
            .collect();
        match BatchError::from_failures(failures, tasks.len()) {
            None => Ok(()),
            Some(err) => {
                self.inner
                    .counters
                    .failed_batches
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    batch_size = tasks.len(),
                    failed = err.failures().len(),
                    "Batch completed with failures"
                );
                Err(err)
            }
        }
    }

    /// Get current executor statistics.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.inner.counters.snapshot(
            self.inner.config.thread_count,
            self.inner.pool.live_workers(),
            self.inner.queue.len(),
        )
    }

    /// Let the current worker threads go.
    ///
    /// Workers finish the task they are running and exit at their next idle
    /// check; they count as live until then. Queued tasks are not lost: their
    /// submitters keep draining the queue, and the first parallel batch after
    /// the workers are gone starts a fresh set.
    pub fn shutdown(&self) {
        let retired = self.inner.pool.retire();
        self.inner.signal.notify_all();
        if retired > 0 {
            info!(retired = retired, "Worker threads released");
        }
    }
}

impl Default for RecursiveExecutor {
    /// An executor with one worker per available CPU.
    fn default() -> Self {
        Self::from_valid(ExecutorConfig::default())
    }
}

impl std::fmt::Debug for RecursiveExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveExecutor")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for RecursiveExecutor {
    fn drop(&mut self) {
        // Workers hold the shared state, not the handle; release them so
        // they do not idle forever.
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = RecursiveExecutor::new(ExecutorConfig::new().with_idle_wait_ms(0)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn test_workers_are_spawned_lazily() {
        let executor = RecursiveExecutor::with_thread_count(3);
        assert_eq!(executor.stats().live_workers, 0);

        executor.execute(&[Task::from_fn(|| Ok(()))]).unwrap();
        assert_eq!(executor.stats().live_workers, 0);

        let batch: Vec<_> = (0..4).map(|_| Task::from_fn(|| Ok(()))).collect();
        executor.execute(&batch).unwrap();
        assert_eq!(executor.stats().live_workers, 3);
        assert_eq!(executor.stats().parallel_batches, 1);
        assert_eq!(executor.stats().sequential_batches, 1);
    }

    #[test]
    fn test_shutdown_then_respawn() {
        let executor = RecursiveExecutor::new(
            ExecutorConfig::new()
                .with_thread_count(2)
                .with_idle_wait_ms(5),
        )
        .unwrap();
        let batch: Vec<_> = (0..4).map(|_| Task::from_fn(|| Ok(()))).collect();
        executor.execute(&batch).unwrap();
        assert_eq!(executor.stats().live_workers, 2);

        executor.shutdown();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while executor.stats().live_workers > 0 {
            assert!(std::time::Instant::now() < deadline, "retired workers did not exit");
            thread::sleep(std::time::Duration::from_millis(1));
        }

        executor.execute(&batch).unwrap();
        assert_eq!(executor.stats().live_workers, 2);
        assert!(batch.iter().all(|task| task.is_completed()));
    }

    #[test]
    fn test_worker_threads_use_prefix() {
        let executor = RecursiveExecutor::new(
            ExecutorConfig::new()
                .with_thread_count(2)
                .with_thread_name_prefix("probe"),
        )
        .unwrap();
        let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let batch: Vec<_> = (0..16)
            .map(|_| {
                let names = Arc::clone(&names);
                Task::from_fn(move || {
                    names
                        .lock()
                        .push(thread::current().name().map(str::to_owned));
                    thread::sleep(std::time::Duration::from_millis(2));
                    Ok(())
                })
            })
            .collect();
        executor.execute(&batch).unwrap();

        let caller = thread::current().name().map(str::to_owned);
        for name in names.lock().iter() {
            let from_worker = name.as_deref().is_some_and(|n| n.starts_with("probe-"));
            assert!(from_worker || *name == caller, "unexpected thread {name:?}");
        }
    }
}
