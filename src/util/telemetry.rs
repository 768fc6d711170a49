//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "recursive_executor=info";

/// Install a default fmt subscriber unless one is already set.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_DIRECTIVE`].
/// Thread names are printed so worker activity can be told apart; each task
/// execution also opens a `task` span carrying its label and depth.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_DIRECTIVE);
}

/// Like [`init_tracing`], with a caller-chosen fallback filter.
pub fn init_tracing_with(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
