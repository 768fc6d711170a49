//! Core scheduling: tasks, call stacks, the run queue, workers and the executor.

pub mod call_stack;
pub mod error;
pub mod executor;
pub mod factory;
pub mod run_queue;
pub mod signal;
pub mod stats;
pub mod task;
mod worker_pool;

pub use call_stack::{BatchOrigin, Frame};
pub use error::{AppResult, BatchError, SchedulerError, TaskFailure};
pub use executor::RecursiveExecutor;
pub use factory::{default_executor, set_default_executor};
pub use run_queue::RunQueue;
pub use signal::Signal;
pub use stats::ExecutorStats;
pub use task::{Task, TaskId, TaskState, Work};
