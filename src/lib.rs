//! # Recursive Executor
//!
//! A fork-join task executor for recursive, CPU-bound decompositions.
//!
//! Work is submitted in *batches* of independent tasks. Any task, while it
//! runs, may submit a batch of its own and wait for it. The executor is built
//! for exactly that shape of workload: search trees, divide-and-conquer
//! solvers, population-based optimizers that evaluate their candidates in
//! parallel.
//!
//! ## Core Problem Solved
//!
//! A plain thread pool deadlocks on recursive work as soon as every worker is
//! parked waiting for sub-tasks that no free worker can run. This executor
//! avoids that in two ways:
//!
//! - **Submitters participate**: a thread waiting for its batch keeps
//!   executing queued tasks, from any batch, until its own batch is done.
//!   Every submission makes progress as long as one thread is available,
//!   so even a pool of one worker handles arbitrary nesting.
//! - **Depth-first dispatch**: each batch is tagged with its nesting depth
//!   (tracked per thread) and the run queue always hands out one of the
//!   deepest ready tasks, which keeps the number of half-expanded subtrees
//!   small.
//!
//! ## Key Features
//!
//! - **Lazy worker pool**: OS threads started on the first parallel batch,
//!   detached so they never keep the process alive
//! - **Synchronous modes**: single-task batches, `execute_sequentially`, and
//!   `thread_count = 0` all run in place on the caller
//! - **Isolated failures**: errors (and panics) are captured per task and
//!   reported once per batch as a [`core::BatchError`]
//! - **Configurable**: JSON or environment configuration, see
//!   [`config::ExecutorConfig`]
//!
//! ```rust
//! use recursive_executor::core::{RecursiveExecutor, Task};
//!
//! let executor = RecursiveExecutor::with_thread_count(4);
//! let tasks: Vec<_> = (0..3).map(|_| Task::from_fn(|| Ok(()))).collect();
//! executor.execute(&tasks).unwrap();
//! assert!(tasks.iter().all(|task| task.is_completed()));
//! ```
//!
//! For complete examples, see:
//! - `tests/executor_test.rs` - Batch semantics and failure aggregation
//! - `tests/recursion_test.rs` - Nested batches, depth and deadlock freedom

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and the executor.
pub mod core;
/// Configuration models for the executor.
pub mod config;
/// Shared utilities.
pub mod util;
