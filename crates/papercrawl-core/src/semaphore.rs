//! Counting semaphore for bounded-pool admission.
//!
//! Uses `Mutex + Condvar` from std. The submitter blocks here once every
//! worker holds a permit.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How often a blocked acquirer re-checks the cancellation token
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// A counting semaphore that limits concurrent access to a shared resource.
pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard that releases one permit on drop.
pub struct SemaphoreGuard<'a>(&'a Semaphore);

impl Semaphore {
    /// Create a semaphore with `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    // A panicking task must not wedge admission for the rest of the run
    fn count(&self) -> MutexGuard<'_, usize> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.count();
        while *count == 0 {
            count = self.cond.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
        SemaphoreGuard(self)
    }

    /// Like [`acquire`](Self::acquire), but gives up once `cancel` fires.
    pub fn acquire_unless(&self, cancel: &CancellationToken) -> Option<SemaphoreGuard<'_>> {
        let mut count = self.count();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if *count > 0 {
                *count -= 1;
                return Some(SemaphoreGuard(self));
            }
            count = self
                .cond
                .wait_timeout(count, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn available(&self) -> usize {
        *self.count()
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.0.count();
        *count += 1;
        self.0.cond.notify_one();
    }
}
