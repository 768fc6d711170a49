//! Shared wake-up signal for idle workers and waiting submitters.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Condvar-based notification with a generation counter.
///
/// Notified whenever tasks are enqueued or a task completes. Waiters always
/// use a bounded wait, so a notification lost to a race only costs one idle
/// interval. The generation lets a waiter skip the sleep entirely when
/// something was signalled after it last looked at the queue.
#[derive(Debug, Default)]
pub struct Signal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl Signal {
    /// Create a signal at generation zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Current generation; read it before checking the queue.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Advance the generation and wake every waiter.
    pub fn notify_all(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Wait up to `timeout` unless the generation already moved past `seen`.
    ///
    /// Returns `true` if the signal fired (or had fired) before the timeout.
    pub fn wait_for(&self, seen: u64, timeout: Duration) -> bool {
        let mut generation = self.generation.lock();
        if *generation != seen {
            return true;
        }
        !self.condvar.wait_for(&mut generation, timeout).timed_out()
    }
}
