//! Executor configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Environment variable overriding [`ExecutorConfig::thread_count`].
pub const THREAD_COUNT_ENV: &str = "RECURSIVE_EXECUTOR_THREAD_COUNT";
/// Environment variable overriding [`ExecutorConfig::idle_wait_ms`].
pub const IDLE_WAIT_ENV: &str = "RECURSIVE_EXECUTOR_IDLE_WAIT_MS";
/// Environment variable overriding [`ExecutorConfig::thread_name_prefix`].
pub const THREAD_PREFIX_ENV: &str = "RECURSIVE_EXECUTOR_THREAD_PREFIX";

const MIN_STACK_SIZE: usize = 64 * 1024;

/// Configuration of a [`RecursiveExecutor`](crate::core::RecursiveExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of background worker threads. `0` runs every batch
    /// synchronously on the submitting thread.
    pub thread_count: usize,
    /// Upper bound, in milliseconds, on any idle wait before the run queue
    /// is checked again.
    pub idle_wait_ms: u64,
    /// Worker threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
    /// Stack size of worker threads; the platform default when `None`.
    pub thread_stack_size: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get(),
            idle_wait_ms: 50,
            thread_name_prefix: "recursive-executor".into(),
            thread_stack_size: None,
        }
    }
}

impl ExecutorConfig {
    /// Default configuration sized to the host's available parallelism.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the idle wait bound in milliseconds.
    #[must_use]
    pub const fn with_idle_wait_ms(mut self, idle_wait_ms: u64) -> Self {
        self.idle_wait_ms = idle_wait_ms;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Idle wait bound as a duration.
    #[must_use]
    pub const fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.idle_wait_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "idle_wait_ms must be greater than 0".into(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(SchedulerError::InvalidConfig(format!(
                    "thread_stack_size must be at least {MIN_STACK_SIZE} bytes, got {size}"
                )));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| SchedulerError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment, loading a `.env`
    /// file first if one is present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Environment` if a variable does not parse, or
    /// `SchedulerError::InvalidConfig` if the result does not validate.
    pub fn from_env() -> Result<Self, SchedulerError> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    fn from_lookup<F>(lookup: F) -> Result<Self, SchedulerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(THREAD_COUNT_ENV) {
            cfg.thread_count = parse_var(THREAD_COUNT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(IDLE_WAIT_ENV) {
            cfg.idle_wait_ms = parse_var(IDLE_WAIT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(THREAD_PREFIX_ENV) {
            cfg.thread_name_prefix = raw;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, SchedulerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| SchedulerError::Environment {
        name: name.to_owned(),
        reason: format!("{e} (value `{raw}`)"),
    })
}
