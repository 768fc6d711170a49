//! Process-wide default executor.
//!
//! Components that run batches should hold an explicit
//! `Arc<RecursiveExecutor>`; this module only supplies a shared default for
//! callers that have none, and lets tests swap it.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::config::ExecutorConfig;

use super::executor::RecursiveExecutor;

static DEFAULT_EXECUTOR: RwLock<Option<Arc<RecursiveExecutor>>> = parking_lot::const_rwlock(None);

/// The shared default executor, created on first use from
/// [`ExecutorConfig::from_env`]. An unusable environment falls back to the
/// built-in defaults.
pub fn default_executor() -> Arc<RecursiveExecutor> {
    if let Some(executor) = DEFAULT_EXECUTOR.read().as_ref() {
        return Arc::clone(executor);
    }

    let mut slot = DEFAULT_EXECUTOR.write();
    if let Some(executor) = slot.as_ref() {
        return Arc::clone(executor);
    }
    let config = ExecutorConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring executor environment configuration");
        ExecutorConfig::default()
    });
    let executor = match RecursiveExecutor::new(config) {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            warn!(error = %e, "Falling back to default executor configuration");
            Arc::new(RecursiveExecutor::default())
        }
    };
    *slot = Some(Arc::clone(&executor));
    executor
}

/// Replace the shared default executor, returning the previous one.
///
/// Batches already running keep the executor they were submitted to.
pub fn set_default_executor(executor: Arc<RecursiveExecutor>) -> Option<Arc<RecursiveExecutor>> {
    DEFAULT_EXECUTOR.write().replace(executor)
}
