//! Blocking synchronization used by the refresher thread and `AuthFuture::wait`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counting semaphore with a timed wait.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    #[must_use]
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = lock_unpoisoned(&self.count);
        *count += 1;
        self.available.notify_one();
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut count = lock_unpoisoned(&self.count);
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Take a permit if one is available right now.
    pub fn try_wait(&self) -> bool {
        let mut count = lock_unpoisoned(&self.count);
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Wait up to `timeout` for a permit. Returns `true` if one was taken,
    /// `false` if the timeout elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut count = lock_unpoisoned(&self.count);
        while *count == 0 {
            let Some(deadline) = deadline else {
                // Timeout too large to represent: wait without a deadline.
                count = self
                    .available
                    .wait(count)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            count = self
                .available
                .wait_timeout(count, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *count -= 1;
        true
    }
}
