//! Configuration models for the executor.

pub mod executor;

pub use executor::{ExecutorConfig, IDLE_WAIT_ENV, THREAD_COUNT_ENV, THREAD_PREFIX_ENV};
