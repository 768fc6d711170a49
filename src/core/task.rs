//! Tasks: units of work with a single fallible entry point.
//!
//! A [`Task`] wraps a [`Work`] value together with the bookkeeping the
//! executor needs: the depth and label assigned when the task is prepared,
//! its lifecycle state, and the error captured from its run. Tasks are always
//! shared as `Arc<Task<W>>`; the submitter keeps its handles and reads the
//! outcome after the batch returns, while the executor only holds clones
//! while the task is queued or running.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, debug_span};

use super::call_stack::{self, BatchOrigin, Frame};
use super::error::{AppResult, SchedulerError, TaskFailure};
use super::signal::Signal;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The operation a task performs.
///
/// Any `FnMut() -> AppResult<()>` closure is `Work`, so most callers never
/// implement this trait by hand. Implement it on a struct when the task has
/// results to read back after the batch completes:
///
/// ```
/// use recursive_executor::core::{AppResult, RecursiveExecutor, Task, Work};
///
/// struct Square { input: u64, output: u64 }
///
/// impl Work for Square {
///     fn run(&mut self) -> AppResult<()> {
///         self.output = self.input * self.input;
///         Ok(())
///     }
/// }
///
/// let executor = RecursiveExecutor::with_thread_count(2);
/// let tasks: Vec<_> = (1..=3).map(|input| Task::new(Square { input, output: 0 })).collect();
/// executor.execute(&tasks).unwrap();
/// assert_eq!(tasks[2].work().output, 9);
/// ```
pub trait Work: Send + 'static {
    /// Perform the work. An error is captured on the task and reported to
    /// the submitter once the whole batch is done.
    ///
    /// # Errors
    ///
    /// Any error the work chooses to report.
    fn run(&mut self) -> AppResult<()>;
}

impl<F> Work for F
where
    F: FnMut() -> AppResult<()> + Send + 'static,
{
    fn run(&mut self) -> AppResult<()> {
        self()
    }
}

/// Lifecycle of a task within one preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Never prepared.
    Idle,
    /// Prepared and waiting in a queue or about to run in place.
    Scheduled,
    /// Executing on some thread.
    Running,
    /// Finished, successfully or not.
    Completed,
}

impl TaskState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::Completed,
            _ => Self::Idle,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Scheduled => 1,
            Self::Running => 2,
            Self::Completed => 3,
        }
    }
}

/// A unit of schedulable work plus its execution record.
pub struct Task<W> {
    id: TaskId,
    work: Mutex<W>,
    depth: AtomicUsize,
    label: Mutex<Arc<str>>,
    state: AtomicU8,
    failure: Mutex<Option<Arc<anyhow::Error>>>,
}

impl<W: Work> Task<W> {
    /// Wrap `work` into a new shareable task.
    pub fn new(work: W) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::next(),
            work: Mutex::new(work),
            depth: AtomicUsize::new(0),
            label: Mutex::new(Arc::from("")),
            state: AtomicU8::new(TaskState::Idle.as_u8()),
            failure: Mutex::new(None),
        })
    }
}

impl<F> Task<F>
where
    F: FnMut() -> AppResult<()> + Send + 'static,
{
    /// Wrap a closure into a new shareable task.
    ///
    /// Equivalent to [`Task::new`], but the closure's signature is inferred
    /// from this bound, so `Task::from_fn(|| Ok(()))` needs no annotation.
    pub fn from_fn(f: F) -> Arc<Self> {
        Self::new(f)
    }
}

impl<W> Task<W> {
    /// Unique identity of this task.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Depth assigned at the last preparation; `0` if never prepared.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Diagnostic label inherited from the submitting task or thread.
    pub fn label(&self) -> Arc<str> {
        Arc::clone(&self.label.lock())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the last preparation of this task has finished executing.
    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    /// Error captured from the last run, if any.
    pub fn failure(&self) -> Option<Arc<anyhow::Error>> {
        self.failure.lock().clone()
    }

    /// Whether the last run captured an error.
    pub fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    /// Lock the work, typically to read its results after execution.
    ///
    /// Do not hold the guard while the task may still be running: the run
    /// holds the same lock.
    pub fn work(&self) -> MutexGuard<'_, W> {
        self.work.lock()
    }

    /// Failure record for the batch aggregate, if the last run failed.
    pub(crate) fn failure_at(&self, index: usize) -> Option<TaskFailure> {
        self.failure().map(|error| TaskFailure {
            index,
            task_id: self.id,
            label: self.label(),
            depth: self.depth(),
            error,
        })
    }

    /// Move an idle or completed task to `Scheduled`.
    ///
    /// Returns the state it left, or the in-flight state that refused it.
    fn claim(&self) -> Result<TaskState, TaskState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match TaskState::from_u8(raw) {
                    TaskState::Idle | TaskState::Completed => Some(TaskState::Scheduled.as_u8()),
                    TaskState::Scheduled | TaskState::Running => None,
                }
            })
            .map(TaskState::from_u8)
            .map_err(TaskState::from_u8)
    }

    /// Undo a successful [`claim`](Self::claim).
    fn release(&self, previous: TaskState) {
        self.state.store(previous.as_u8(), Ordering::Release);
    }

    /// Reset the execution record and assign depth and label.
    fn assign(&self, origin: &BatchOrigin) {
        *self.failure.lock() = None;
        *self.label.lock() = Arc::clone(&origin.label);
        self.depth.store(origin.depth, Ordering::Release);
    }
}

/// Schedule every task of a batch at `origin`, or none of them.
///
/// # Panics
///
/// Panics if a task is already scheduled or running, including a task listed
/// twice in the batch. Tasks claimed before the rejected one are restored to
/// their previous state first, so they stay submittable.
pub(crate) fn prepare_batch<W>(tasks: &[Arc<Task<W>>], origin: &BatchOrigin) {
    let mut claimed = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.claim() {
            Ok(previous) => claimed.push(previous),
            Err(state) => {
                for (earlier, previous) in tasks.iter().zip(claimed.iter().copied()) {
                    earlier.release(previous);
                }
                panic!(
                    "task #{} resubmitted while {state:?}; a task may only be submitted again after it completed",
                    task.id
                );
            }
        }
    }
    for task in tasks {
        task.assign(origin);
    }
}

/// Type-erased view of a prepared task, as held by the run queue.
pub(crate) trait Schedulable: Send + Sync {
    /// Execute on the current thread, record the outcome, and notify
    /// `signal` once completed.
    ///
    /// # Panics
    ///
    /// Panics if the call stack of this thread is found corrupted after the
    /// run. The task is marked completed and waiters are notified first.
    fn run_scheduled(&self, signal: &Signal) -> bool;
}

impl<W: Work> Schedulable for Task<W> {
    fn run_scheduled(&self, signal: &Signal) -> bool {
        self.state
            .store(TaskState::Running.as_u8(), Ordering::Release);

        let label = self.label();
        let depth = self.depth();
        call_stack::push(Frame {
            task_id: self.id,
            label: Arc::clone(&label),
        });

        let outcome = {
            let thread_name = call_stack::current_thread_name();
            let span = debug_span!(
                "task",
                task_id = self.id.as_u64(),
                depth,
                name = %format!("{label} > {thread_name}")
            );
            let _entered = span.enter();
            let mut work = self.work.lock();
            panic::catch_unwind(AssertUnwindSafe(|| work.run()))
        };

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(anyhow::Error::new(SchedulerError::TaskPanicked(
                panic_message(payload.as_ref()),
            ))),
        };
        let failed = failure.is_some();
        if let Some(error) = failure {
            debug!(task_id = self.id.as_u64(), depth, error = %error, "task failed");
            *self.failure.lock() = Some(Arc::new(error));
        }

        let popped = call_stack::pop();
        self.state
            .store(TaskState::Completed.as_u8(), Ordering::Release);
        signal.notify_all();

        match popped {
            Some(frame) if frame.task_id == self.id => failed,
            other => panic!(
                "call stack corrupted: task #{} finished but popped {:?}",
                self.id,
                other.map(|frame| frame.task_id)
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

impl<W> fmt::Display for Task<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task #{} [{} depth={} {:?}",
            self.id,
            self.label(),
            self.depth(),
            self.state()
        )?;
        if let Some(error) = self.failure() {
            write!(f, " failure={error}")?;
        }
        write!(f, "]")
    }
}

impl<W> fmt::Debug for Task<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("label", &self.label())
            .field("state", &self.state())
            .field("failure", &self.failure().map(|e| e.to_string()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(depth: usize) -> BatchOrigin {
        BatchOrigin {
            depth,
            label: Arc::from("unit"),
        }
    }

    fn prepare<W>(task: &Arc<Task<W>>, depth: usize) {
        prepare_batch(std::slice::from_ref(task), &origin(depth));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Task::from_fn(|| Ok(()));
        let b = Task::from_fn(|| Ok(()));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), TaskState::Idle);
        assert_eq!(a.depth(), 0);
    }

    #[test]
    fn test_run_records_success() {
        let signal = Signal::new();
        let task = Task::from_fn(|| Ok(()));
        prepare(&task, 2);
        assert_eq!(task.state(), TaskState::Scheduled);

        let failed = task.run_scheduled(&signal);
        assert!(!failed);
        assert!(task.is_completed());
        assert!(task.failure().is_none());
        assert_eq!(task.depth(), 2);
        assert_eq!(&*task.label(), "unit");
        assert_eq!(signal.generation(), 1);
        assert_eq!(call_stack::depth(), 0);
    }

    #[test]
    fn test_run_captures_error() {
        let signal = Signal::new();
        let task = Task::from_fn(|| Err(anyhow::anyhow!("boom")));
        prepare(&task, 1);
        assert!(task.run_scheduled(&signal));
        assert!(task.is_completed());
        assert_eq!(task.failure().unwrap().to_string(), "boom");
        assert_eq!(task.failure_at(3).unwrap().index, 3);
    }

    #[test]
    fn test_run_captures_panic() {
        let signal = Signal::new();
        let task = Task::from_fn(|| -> AppResult<()> { panic!("kaput") });
        prepare(&task, 1);
        assert!(task.run_scheduled(&signal));
        assert!(task.is_completed());
        assert_eq!(task.failure().unwrap().to_string(), "task panicked: kaput");
        assert_eq!(call_stack::depth(), 0);
    }

    #[test]
    fn test_running_task_sees_itself_on_call_stack() {
        let signal = Signal::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let task = {
            let observed = Arc::clone(&observed);
            Task::from_fn(move || {
                observed.store(call_stack::depth(), Ordering::SeqCst);
                Ok(())
            })
        };
        prepare(&task, 1);
        task.run_scheduled(&signal);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reprepare_after_completion_resets_record() {
        let signal = Signal::new();
        let mut fail = true;
        let task = Task::from_fn(move || {
            if std::mem::replace(&mut fail, false) {
                Err(anyhow::anyhow!("first run fails"))
            } else {
                Ok(())
            }
        });
        prepare(&task, 1);
        assert!(task.run_scheduled(&signal));

        prepare(&task, 4);
        assert!(!task.is_completed());
        assert!(task.failure().is_none());
        assert!(!task.run_scheduled(&signal));
        assert_eq!(task.depth(), 4);
    }

    #[test]
    #[should_panic(expected = "resubmitted")]
    fn test_resubmitting_scheduled_task_panics() {
        let task = Task::from_fn(|| Ok(()));
        prepare(&task, 1);
        prepare(&task, 1);
    }

    #[test]
    fn test_display() {
        let task = Task::from_fn(|| Err(anyhow::anyhow!("boom")));
        prepare(&task, 2);
        task.run_scheduled(&Signal::new());
        let text = task.to_string();
        assert!(text.starts_with(&format!("task #{} [unit depth=2 Completed", task.id())));
        assert!(text.ends_with("failure=boom]"));
    }

    #[test]
    fn test_rejected_batch_restores_claimed_tasks() {
        let done = Task::<fn() -> AppResult<()>>::from_fn(|| Err(anyhow::anyhow!("earlier failure")));
        prepare(&done, 1);
        done.run_scheduled(&Signal::new());
        let fresh = Task::<fn() -> AppResult<()>>::from_fn(|| Ok(()));

        let batch = [Arc::clone(&done), Arc::clone(&fresh), Arc::clone(&fresh)];
        let rejected =
            panic::catch_unwind(AssertUnwindSafe(|| prepare_batch(&batch, &origin(3))));

        assert!(rejected.is_err());
        assert_eq!(done.state(), TaskState::Completed);
        assert_eq!(done.failure().unwrap().to_string(), "earlier failure");
        assert_eq!(done.depth(), 1);
        assert_eq!(fresh.state(), TaskState::Idle);

        prepare_batch(&[Arc::clone(&done), Arc::clone(&fresh)], &origin(2));
        assert_eq!(done.state(), TaskState::Scheduled);
        assert!(done.failure().is_none());
        assert_eq!(fresh.depth(), 2);
    }
}
