//! Error types for executor operations.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::task::TaskId;

/// Errors produced by executor components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An environment variable held a value that could not be parsed.
    #[error("environment variable `{name}` is invalid: {reason}")]
    Environment {
        /// Variable name.
        name: String,
        /// Parse failure.
        reason: String,
    },
    /// The work of a task panicked; the payload message is kept.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Application-facing result using anyhow for higher-level contexts.
///
/// This is also the return type of [`Work::run`](super::task::Work::run), so
/// a task may propagate any error with `?`, including the [`BatchError`] of a
/// nested batch.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// One failed task of a batch.
#[derive(Clone)]
pub struct TaskFailure {
    /// Position of the task in the submitted batch.
    pub index: usize,
    /// Identity of the failed task.
    pub task_id: TaskId,
    /// Diagnostic label the task ran under.
    pub label: Arc<str>,
    /// Depth the task was scheduled at.
    pub depth: usize,
    /// The captured error, shared with the task itself.
    pub error: Arc<anyhow::Error>,
}

impl TaskFailure {
    /// Display form of the captured error.
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("index", &self.index)
            .field("task_id", &self.task_id)
            .field("label", &self.label)
            .field("depth", &self.depth)
            .field("error", &format_args!("{:#}", self.error))
            .finish()
    }
}

/// Aggregate failure of one batch: exactly the tasks whose work returned an
/// error, in submission order.
#[derive(Debug, Clone, Error)]
#[error(
    "{} of {batch_size} tasks failed (first: task #{}: {})",
    .failures.len(),
    first_id(.failures),
    first_message(.failures)
)]
pub struct BatchError {
    failures: Vec<TaskFailure>,
    batch_size: usize,
}

fn first_id(failures: &[TaskFailure]) -> String {
    failures
        .first()
        .map_or_else(String::new, |f| f.task_id.to_string())
}

fn first_message(failures: &[TaskFailure]) -> String {
    failures.first().map_or_else(String::new, TaskFailure::message)
}

impl BatchError {
    /// Build the aggregate for a batch, or `None` when nothing failed.
    #[must_use]
    pub fn from_failures(failures: Vec<TaskFailure>, batch_size: usize) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self {
                failures,
                batch_size,
            })
        }
    }

    /// The failed tasks in submission order.
    #[must_use]
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    /// Number of tasks in the batch, failed or not.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batch positions of the failed tasks.
    pub fn failed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.failures.iter().map(|f| f.index)
    }
}
