//! Bounded pool of fungible resource units
//!
//! The pool owns a fixed quantity of interchangeable units (hotplates) and
//! hands them out in response to acquire requests. Acquisition never blocks
//! and never grants more than is currently free; it saturates at zero.
//!
//! Two access paths exist:
//!
//! - [`PoolAccess::Atomic`]: each acquire/release is a single compare-and-swap
//!   or `fetch_add`, so concurrent callers can never over-grant.
//! - [`PoolAccess::Plain`]: each acquire/release is a separate read and write.
//!   This is only correct when the caller serializes access (for example by
//!   holding an [`ExclusiveArbiter`](crate::arbiter::ExclusiveArbiter) guard).
//! - [`PoolAccess::Racy`]: the same split read and write with a yield in
//!   between. Used without serialization it reproduces lost updates and
//!   over-grants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{trace, warn};

/// How a caller touches the pool's free-unit counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAccess {
    /// Indivisible read-modify-write
    Atomic,
    /// Separate read then write; safe only under external serialization
    Plain,
    /// Separate read, yield, then write; for deliberately unarbitrated callers
    Racy,
}

/// A bounded quantity of fungible units shared by all workers
#[derive(Debug)]
pub struct ResourcePool {
    total_units: usize,
    free_units: AtomicUsize,
}

impl ResourcePool {
    /// Create a pool with all `total_units` free
    #[must_use]
    pub fn new(total_units: usize) -> Self {
        Self {
            total_units,
            free_units: AtomicUsize::new(total_units),
        }
    }

    /// Configured capacity
    #[must_use]
    pub const fn total_units(&self) -> usize {
        self.total_units
    }

    /// Units currently free (a snapshot)
    #[must_use]
    pub fn free_units(&self) -> usize {
        self.free_units.load(Ordering::Acquire)
    }

    /// Grant `min(requested, free)` units and remove them from the pool
    ///
    /// Returns 0 when `requested` is 0 or nothing is free.
    pub fn acquire(&self, requested: usize) -> usize {
        if requested == 0 {
            return 0;
        }

        let mut current = self.free_units.load(Ordering::Acquire);
        loop {
            let granted = requested.min(current);
            if granted == 0 {
                return 0;
            }

            match self.free_units.compare_exchange_weak(
                current,
                current - granted,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    trace!(requested, granted, "acquired units");
                    return granted;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Return `amount` units to the pool
    ///
    /// The caller must hold at least `amount` unreleased units.
    pub fn release(&self, amount: usize) {
        if amount == 0 {
            return;
        }

        let previous = self.free_units.fetch_add(amount, Ordering::AcqRel);
        trace!(amount, "released units");

        if previous + amount > self.total_units {
            warn!(
                "Pool over-released: {} free of {} total",
                previous + amount,
                self.total_units
            );
        }
    }

    /// Acquire with a separate read and write of the free counter
    ///
    /// Not atomic as a whole. Correct only while the caller holds exclusive
    /// access to the pool.
    pub fn acquire_serialized(&self, requested: usize) -> usize {
        self.split_acquire(requested, false)
    }

    /// Release with a separate read and write of the free counter
    pub fn release_serialized(&self, amount: usize) {
        self.split_release(amount, false);
    }

    /// Like [`acquire_serialized`](Self::acquire_serialized), but yields
    /// between the read and the write so concurrent interleavings surface
    pub fn acquire_unsynchronized(&self, requested: usize) -> usize {
        self.split_acquire(requested, true)
    }

    /// Like [`release_serialized`](Self::release_serialized), but yields
    /// between the read and the write
    pub fn release_unsynchronized(&self, amount: usize) {
        self.split_release(amount, true);
    }

    fn split_acquire(&self, requested: usize, widen: bool) -> usize {
        if requested == 0 {
            return 0;
        }

        let observed = self.free_units.load(Ordering::Relaxed);
        let granted = requested.min(observed);
        if granted == 0 {
            return 0;
        }

        if widen {
            thread::yield_now();
        }
        self.free_units.store(observed - granted, Ordering::Relaxed);
        trace!(requested, granted, observed, "acquired units without sync");
        granted
    }

    fn split_release(&self, amount: usize, widen: bool) {
        if amount == 0 {
            return;
        }

        let observed = self.free_units.load(Ordering::Relaxed);
        if widen {
            thread::yield_now();
        }
        self.free_units.store(observed + amount, Ordering::Relaxed);
        trace!(amount, observed, "released units without sync");
    }

    /// Acquire through the given access path
    pub fn acquire_with(&self, access: PoolAccess, requested: usize) -> usize {
        match access {
            PoolAccess::Atomic => self.acquire(requested),
            PoolAccess::Plain => self.acquire_serialized(requested),
            PoolAccess::Racy => self.acquire_unsynchronized(requested),
        }
    }

    /// Release through the given access path
    pub fn release_with(&self, access: PoolAccess, amount: usize) {
        match access {
            PoolAccess::Atomic => self.release(amount),
            PoolAccess::Plain => self.release_serialized(amount),
            PoolAccess::Racy => self.release_unsynchronized(amount),
        }
    }

    /// Start an empty lease against this pool
    #[must_use]
    pub const fn lease(&self, access: PoolAccess) -> Lease<'_> {
        Lease {
            pool: self,
            access,
            held: 0,
        }
    }
}

/// Units held by one worker, returned to the pool on drop
///
/// Dropping a lease (normal completion, early `?` return, or unwinding)
/// releases every unit it still holds, so a failing worker cannot shrink the
/// pool permanently.
#[derive(Debug)]
pub struct Lease<'a> {
    pool: &'a ResourcePool,
    access: PoolAccess,
    held: usize,
}

impl Lease<'_> {
    /// Units currently held
    #[must_use]
    pub const fn held(&self) -> usize {
        self.held
    }

    /// Acquire up to `target - held` more units; returns the amount granted
    pub fn top_up(&mut self, target: usize) -> usize {
        let granted = self
            .pool
            .acquire_with(self.access, target.saturating_sub(self.held));
        self.held += granted;
        granted
    }

    /// Return every held unit now; returns the amount released
    pub fn release_all(&mut self) -> usize {
        let amount = std::mem::take(&mut self.held);
        self.pool.release_with(self.access, amount);
        amount
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_grants_min_of_requested_and_free() {
        let pool = ResourcePool::new(4);

        assert_eq!(pool.acquire(3), 3);
        assert_eq!(pool.free_units(), 1);

        // Only one left
        assert_eq!(pool.acquire(3), 1);
        assert_eq!(pool.free_units(), 0);

        // Saturated
        assert_eq!(pool.acquire(2), 0);
        assert_eq!(pool.free_units(), 0);
    }

    #[test]
    fn test_release_returns_units() {
        let pool = ResourcePool::new(4);
        let granted = pool.acquire(4);
        pool.release(granted);
        assert_eq!(pool.free_units(), 4);
    }

    #[test]
    fn test_zero_requests_are_noops() {
        let pool = ResourcePool::new(4);
        pool.acquire(1);

        assert_eq!(pool.acquire(0), 0);
        pool.release(0);
        assert_eq!(pool.acquire_unsynchronized(0), 0);
        pool.release_unsynchronized(0);
        assert_eq!(pool.acquire_serialized(0), 0);
        pool.release_serialized(0);

        assert_eq!(pool.free_units(), 3);
    }

    #[test]
    fn test_unsynchronized_path_matches_atomic_when_serial() {
        let pool = ResourcePool::new(4);

        assert_eq!(pool.acquire_unsynchronized(3), 3);
        assert_eq!(pool.acquire_unsynchronized(3), 1);
        assert_eq!(pool.acquire_unsynchronized(3), 0);
        pool.release_unsynchronized(4);

        assert_eq!(pool.free_units(), 4);
    }

    #[test]
    fn test_serialized_path_is_exact_under_a_lock() {
        let pool = ResourcePool::new(4);
        let lock = std::sync::Mutex::new(());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let _held = lock.lock().unwrap();
                        let granted = pool.acquire_with(PoolAccess::Plain, 3);
                        pool.release_with(PoolAccess::Plain, granted);
                    }
                });
            }
        });

        assert_eq!(pool.free_units(), 4);
    }

    #[test]
    fn test_lease_top_up_never_exceeds_target() {
        let pool = ResourcePool::new(4);
        let other = pool.acquire(3);

        let mut lease = pool.lease(PoolAccess::Atomic);
        assert_eq!(lease.top_up(3), 1);
        assert_eq!(lease.held(), 1);

        pool.release(other);
        assert_eq!(lease.top_up(3), 2);
        assert_eq!(lease.held(), 3);

        // Already at target
        assert_eq!(lease.top_up(3), 0);
        assert_eq!(pool.free_units(), 1);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let pool = ResourcePool::new(4);
        {
            let mut lease = pool.lease(PoolAccess::Plain);
            lease.top_up(3);
            assert_eq!(pool.free_units(), 1);
        }
        assert_eq!(pool.free_units(), 4);
    }

    #[test]
    fn test_lease_release_all_is_single_shot() {
        let pool = ResourcePool::new(4);
        let mut lease = pool.lease(PoolAccess::Atomic);
        lease.top_up(2);

        assert_eq!(lease.release_all(), 2);
        assert_eq!(lease.release_all(), 0);
        drop(lease);

        assert_eq!(pool.free_units(), 4);
    }

    #[test]
    fn test_atomic_acquire_never_over_grants_under_contention() {
        let pool = ResourcePool::new(8);
        let granted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| pool.acquire(3)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(granted, 8);
        assert_eq!(pool.free_units(), 0);
    }
}
