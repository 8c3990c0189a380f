//! Blocking counting semaphore for OS threads
//!
//! Provides a semaphore primitive that parks the calling thread until a permit
//! is available. It bounds how many threads may be inside a region at once,
//! independent of whatever those threads do once admitted.
//!
//! # Example
//!
//! ```rust
//! use hotplate_sync::Semaphore;
//!
//! // Create semaphore with 3 permits
//! let semaphore = Semaphore::new(3);
//!
//! // Acquire permit before entering the region
//! let permit = semaphore.acquire();
//!
//! // Do work while holding permit
//! // ...
//!
//! // Permit automatically released when dropped
//! drop(permit);
//! assert_eq!(semaphore.available_permits(), 3);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// A counting semaphore for bounding how many threads proceed concurrently
///
/// The semaphore maintains a fixed number of permits that must be acquired
/// before entering the guarded region. When all permits are in use,
/// [`acquire`](Self::acquire) parks the calling thread until one is released.
///
/// # Design
///
/// - **Lock-free fast path**: permits are taken with a compare-and-swap loop
///   when one is available
/// - **Parked waiters**: blocked threads sleep on a condition variable; any
///   waiter may be admitted next (no FIFO guarantee)
/// - **RAII permits**: [`SemaphorePermit`] releases on drop, including during
///   unwinding
/// - **Cloneable**: clones share the same permit count
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner>,
}

/// Internal shared state for the semaphore
struct SemaphoreInner {
    /// Available permits (atomic for lock-free operations)
    permits: AtomicUsize,
    /// Maximum permits (configured capacity)
    max_permits: usize,
    /// Held by waiters while they re-check the count, and by releasers while
    /// they notify, so a release can never slip between check and park
    lock: Mutex<()>,
    /// Signalled once per released permit
    released: Condvar,
}

impl Semaphore {
    /// Create a new semaphore with the given number of permits
    ///
    /// # Arguments
    ///
    /// * `permits` - The initial number of permits (maximum concurrency)
    ///
    /// # Panics
    ///
    /// Panics if `permits` is 0 (semaphore must have at least one permit)
    ///
    /// # Example
    ///
    /// ```rust
    /// use hotplate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(3);
    /// assert_eq!(sem.available_permits(), 3);
    /// ```
    #[must_use]
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "Semaphore must have at least one permit");
        Self {
            inner: Arc::new(SemaphoreInner {
                permits: AtomicUsize::new(permits),
                max_permits: permits,
                lock: Mutex::new(()),
                released: Condvar::new(),
            }),
        }
    }

    /// Acquire a permit, parking the current thread if none are available
    ///
    /// Returns a [`SemaphorePermit`] that will release the permit when dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hotplate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1);
    ///
    /// let permit = sem.acquire();
    /// assert_eq!(sem.available_permits(), 0);
    /// drop(permit);
    /// assert_eq!(sem.available_permits(), 1);
    /// ```
    pub fn acquire(&self) -> SemaphorePermit {
        if let Some(permit) = self.try_acquire() {
            return permit;
        }

        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            // Re-check under the lock; a release that happened before we took
            // the lock is visible here, one that happens after will notify us
            if let Some(permit) = self.try_acquire() {
                return permit;
            }

            guard = self
                .inner
                .released
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Try to acquire a permit without blocking
    ///
    /// Returns `Some(SemaphorePermit)` if a permit was immediately available,
    /// or `None` if all permits are currently in use.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hotplate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1);
    ///
    /// let permit1 = sem.try_acquire();
    /// assert!(permit1.is_some());
    ///
    /// let permit2 = sem.try_acquire();
    /// assert!(permit2.is_none());  // No permits left
    /// ```
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphorePermit> {
        let mut current = self.inner.permits.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return None;
            }

            match self.inner.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SemaphorePermit {
                        semaphore: self.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Get the number of available permits
    ///
    /// Useful for monitoring; the value may change immediately after reading.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.permits.load(Ordering::Acquire)
    }

    /// Get the maximum number of permits (configured limit)
    ///
    /// # Example
    ///
    /// ```rust
    /// use hotplate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(3);
    /// assert_eq!(sem.max_permits(), 3);
    /// ```
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.inner.max_permits
    }

    /// Get the number of permits currently in use (max - available)
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.max_permits - self.available_permits()
    }

    /// Release a permit (called by `SemaphorePermit::drop`)
    fn release(&self) {
        self.inner.permits.fetch_add(1, Ordering::Release);

        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.released.notify_one();
    }
}

/// RAII guard that releases a semaphore permit on drop
///
/// Returned by [`Semaphore::acquire`] and [`Semaphore::try_acquire`]. Each
/// permit releases exactly once, when it goes out of scope.
///
/// # Example
///
/// ```rust
/// use hotplate_sync::Semaphore;
///
/// let sem = Semaphore::new(2);
///
/// {
///     let _permit = sem.acquire();
///     assert_eq!(sem.available_permits(), 1);
/// } // Permit released automatically when scope ends
///
/// assert_eq!(sem.available_permits(), 2);
/// ```
pub struct SemaphorePermit {
    /// Reference to the semaphore that issued this permit
    semaphore: Semaphore,
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_semaphore_new() {
        let sem = Semaphore::new(3);
        assert_eq!(sem.available_permits(), 3);
        assert_eq!(sem.max_permits(), 3);
        assert_eq!(sem.in_use(), 0);
    }

    #[test]
    fn test_semaphore_try_acquire() {
        let sem = Semaphore::new(2);

        let permit1 = sem.try_acquire();
        assert!(permit1.is_some());
        assert_eq!(sem.available_permits(), 1);
        assert_eq!(sem.in_use(), 1);

        let permit2 = sem.try_acquire();
        assert!(permit2.is_some());
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(sem.in_use(), 2);

        // Exhausted
        let permit3 = sem.try_acquire();
        assert!(permit3.is_none());
        assert_eq!(sem.available_permits(), 0);

        drop(permit1);
        assert_eq!(sem.available_permits(), 1);
        assert_eq!(sem.in_use(), 1);

        let permit4 = sem.try_acquire();
        assert!(permit4.is_some());
        assert_eq!(sem.available_permits(), 0);
    }

    #[test]
    fn test_semaphore_permit_drop() {
        let sem = Semaphore::new(1);

        {
            let _permit = sem.try_acquire().unwrap();
            assert_eq!(sem.available_permits(), 0);
        }

        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_semaphore_blocking_and_wakeup() {
        let sem = Semaphore::new(1);
        let permit = sem.acquire();

        let (tx, rx) = mpsc::channel();
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            let _permit = sem2.acquire();
            tx.send(42).unwrap();
        });

        // The spawned thread must stay parked while we hold the only permit
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        drop(permit);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        handle.join().unwrap();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_semaphore_permit_released_on_panic() {
        let sem = Semaphore::new(1);
        let sem2 = sem.clone();

        let result = thread::spawn(move || {
            let _permit = sem2.acquire();
            panic!("worker failed while admitted");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_semaphore_bounds_concurrency() {
        let sem = Semaphore::new(3);
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sem = sem.clone();
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = sem.acquire();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sem.available_permits(), 3);
    }

    #[test]
    fn test_semaphore_clone() {
        let sem = Semaphore::new(10);
        let sem2 = sem.clone();

        let permit1 = sem.acquire();
        assert_eq!(sem2.available_permits(), 9);

        let permit2 = sem2.acquire();
        assert_eq!(sem.available_permits(), 8);

        drop(permit1);
        drop(permit2);
        assert_eq!(sem.available_permits(), 10);
    }

    #[test]
    #[should_panic(expected = "Semaphore must have at least one permit")]
    fn test_semaphore_zero_permits_panics() {
        let _sem = Semaphore::new(0);
    }
}
