//! Counting admission gate
//!
//! Limits how many workers may be inside a region at the same time. The gate
//! meters admissions only; it knows nothing about the resource pool.

use hotplate_sync::{Semaphore, SemaphorePermit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Admits at most `capacity` workers concurrently
///
/// Waiters are admitted in no particular order. Every [`GatePass`] frees its
/// slot exactly once, on drop.
#[derive(Clone)]
pub struct AdmissionGate {
    semaphore: Semaphore,
    occupancy: Arc<Occupancy>,
}

/// In-flight accounting used to observe the admission bound
#[derive(Default)]
struct Occupancy {
    inside: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionGate {
    /// Create a gate with `capacity` slots
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. Configuration validation rejects that before
    /// a gate is ever built.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Semaphore::new(capacity),
            occupancy: Arc::new(Occupancy::default()),
        }
    }

    /// Block until a slot is free, then take it
    pub fn enter(&self) -> GatePass {
        let permit = self.semaphore.acquire();
        let now = self.occupancy.inside.fetch_add(1, Ordering::AcqRel) + 1;
        self.occupancy.peak.fetch_max(now, Ordering::AcqRel);

        GatePass {
            occupancy: Arc::clone(&self.occupancy),
            _permit: permit,
        }
    }

    /// Take a slot only if one is free right now
    #[must_use]
    pub fn try_enter(&self) -> Option<GatePass> {
        let permit = self.semaphore.try_acquire()?;
        let now = self.occupancy.inside.fetch_add(1, Ordering::AcqRel) + 1;
        self.occupancy.peak.fetch_max(now, Ordering::AcqRel);

        Some(GatePass {
            occupancy: Arc::clone(&self.occupancy),
            _permit: permit,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.semaphore.max_permits()
    }

    /// Slots not currently taken
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Workers currently admitted
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.occupancy.inside.load(Ordering::Acquire)
    }

    /// Highest number of workers ever admitted at once
    #[must_use]
    pub fn peak_admitted(&self) -> usize {
        self.occupancy.peak.load(Ordering::Acquire)
    }
}

/// Proof of admission; frees the slot when dropped
pub struct GatePass {
    occupancy: Arc<Occupancy>,
    // Dropped after the occupancy decrement in `drop` below
    _permit: SemaphorePermit,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        self.occupancy.inside.fetch_sub(1, Ordering::AcqRel);
    }
}
