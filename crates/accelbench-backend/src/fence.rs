//! Timeline fence shared between the host and a device queue.
//!
//! A [`Fence`] is a monotonically increasing counter plus a completion event.
//! Queues advance it from the device timeline once all work submitted ahead
//! of a signal has drained; the host blocks on it with [`Fence::wait_for`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::types::next_handle;

#[derive(Debug)]
struct FenceState {
    id: u64,
    completed: Mutex<u64>,
    event: Condvar,
    waits: AtomicU64,
}

/// Monotonic completion counter with a blocking wait.
///
/// Clones refer to the same timeline.
#[derive(Debug, Clone)]
pub struct Fence {
    state: Arc<FenceState>,
}

impl Fence {
    /// Create a fence whose counter starts at `initial`.
    pub fn new(initial: u64) -> Self {
        Self {
            state: Arc::new(FenceState {
                id: next_handle(),
                completed: Mutex::new(initial),
                event: Condvar::new(),
                waits: AtomicU64::new(0),
            }),
        }
    }

    /// Opaque fence handle.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// The highest value the device has completed.
    pub fn completed_value(&self) -> u64 {
        *self.state.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `value` as completed on the device timeline and wake waiters.
    ///
    /// The counter never moves backwards: completing a value at or below the
    /// current one is a no-op. Returns whether the counter advanced.
    pub fn complete(&self, value: u64) -> bool {
        let mut completed = self.state.completed.lock().unwrap_or_else(PoisonError::into_inner);
        if value <= *completed {
            return false;
        }
        *completed = value;
        drop(completed);
        self.state.event.notify_all();
        true
    }

    /// Block until the counter reaches `value`, or `timeout` elapses.
    ///
    /// `None` waits forever. Returns `true` once the value has been reached;
    /// returns immediately if it already was.
    pub fn wait_for(&self, value: u64, timeout: Option<Duration>) -> bool {
        self.state.waits.fetch_add(1, Ordering::Relaxed);
        let mut completed = self.state.completed.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(timeout) = timeout else {
            while *completed < value {
                completed =
                    self.state.event.wait(completed).unwrap_or_else(PoisonError::into_inner);
            }
            return true;
        };

        let deadline = Instant::now() + timeout;
        while *completed < value {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .state
                .event
                .wait_timeout(completed, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            completed = guard;
        }
        true
    }

    /// Number of times [`Fence::wait_for`] has been called.
    pub fn wait_count(&self) -> u64 {
        self.state.waits.load(Ordering::Relaxed)
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new(0)
    }
}
