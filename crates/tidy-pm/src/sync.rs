//! Thread-blocking semaphore
//!
//! Caps the number of concurrent network fetches across resolver workers.
//! Permits are released on guard drop, so a worker that errors out cannot
//! leak one.

use parking_lot::{Condvar, Mutex};

/// Counting semaphore that blocks the calling thread.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with `permits` initially available.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Acquire a permit, blocking until one is available.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;

        SemaphoreGuard { semaphore: self }
    }

    /// Acquire a permit without blocking, if one is available.
    pub fn try_acquire(&self) -> Option<SemaphoreGuard<'_>> {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;

        Some(SemaphoreGuard { semaphore: self })
    }

    /// Currently available permits.
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }
}

/// Holds one permit; released on drop.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
