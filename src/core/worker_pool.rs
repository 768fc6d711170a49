//! Lazily grown pool of background worker threads.
//!
//! Workers are plain OS threads that loop over the shared run queue: pop the
//! deepest ready task and run it, or wait on the executor's signal for a
//! bounded interval. They are spawned on the first parallel batch, never
//! joined, and never keep the process alive.
//!
//! The live count has its own lock. The shortfall is computed and claimed
//! under that lock, and the threads are spawned after it is released, so
//! thread creation never blocks other submitters.
//!
//! Retiring the pool bumps its epoch: workers of an older epoch leave their
//! loop at the next idle check. They stay in the live count until they have
//! actually exited, so a batch submitted meanwhile never tops the pool up
//! past the configured thread count; the batch after they are gone spawns a
//! fresh set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::executor::ExecutorInner;

#[derive(Debug, Default)]
struct PoolState {
    live: usize,
    next_worker_id: usize,
    epoch: u64,
}

/// Live-thread bookkeeping for an executor.
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    state: Mutex<PoolState>,
    epoch: AtomicU64,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker threads alive, including retired ones not yet exited.
    pub fn live_workers(&self) -> usize {
        self.state.lock().live
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Top the pool up to the configured thread count.
    pub fn ensure_workers(inner: &Arc<ExecutorInner>) {
        let target = inner.config.thread_count;
        let (missing, first_id, epoch) = {
            let mut state = inner.pool.state.lock();
            let missing = target.saturating_sub(state.live);
            if missing == 0 {
                return;
            }
            state.live = target;
            let first_id = state.next_worker_id;
            state.next_worker_id += missing;
            (missing, first_id, state.epoch)
        };

        for worker_id in first_id..first_id + missing {
            if let Err(e) = spawn_worker(Arc::clone(inner), worker_id, epoch) {
                warn!(
                    worker_id = worker_id,
                    error = %e,
                    "Failed to spawn worker thread; submitters keep executing their own batches"
                );
                inner.pool.worker_exited();
            }
        }

        info!(spawned = missing, thread_count = target, "Worker threads started");
    }

    /// Ask every current worker to exit after its running task.
    ///
    /// Returns the number of workers alive at the time of the call.
    pub fn retire(&self) -> usize {
        let mut state = self.state.lock();
        state.epoch += 1;
        self.epoch.store(state.epoch, Ordering::Release);
        state.live
    }

    fn worker_exited(&self) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
    }
}

fn spawn_worker(inner: Arc<ExecutorInner>, worker_id: usize, epoch: u64) -> std::io::Result<()> {
    let mut builder =
        thread::Builder::new().name(format!("{}-{worker_id}", inner.config.thread_name_prefix));
    if let Some(size) = inner.config.thread_stack_size {
        builder = builder.stack_size(size);
    }
    // The handle is dropped: workers are detached.
    builder
        .spawn(move || worker_loop(&inner, worker_id, epoch))
        .map(drop)
}

/// Decrements the live count however the worker leaves its loop.
struct WorkerExit<'a> {
    pool: &'a WorkerPool,
    worker_id: usize,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(worker_id = self.worker_id, "Worker thread panicked");
        }
        self.pool.worker_exited();
        debug!(worker_id = self.worker_id, "Worker thread exiting");
    }
}

fn worker_loop(inner: &ExecutorInner, worker_id: usize, epoch: u64) {
    let _exit = WorkerExit {
        pool: &inner.pool,
        worker_id,
    };
    debug!(worker_id = worker_id, epoch = epoch, "Worker thread started");

    while inner.pool.is_current(epoch) {
        inner.run_next_or_wait();
    }
}
