//! Arbitration strategies for the worker critical section
//!
//! A worker's business logic is identical in every scenario; only the way it
//! enters the region around that logic changes:
//!
//! - [`Arbitration::Unsynchronized`]: no arbitration at all. Workers race on the
//!   pool with plain reads and writes. Kept only to demonstrate the failure.
//! - [`Arbitration::Exclusive`]: one worker at a time, via [`ExclusiveArbiter`].
//! - [`Arbitration::Counting`]: up to `capacity` workers at a time, via
//!   [`AdmissionGate`].

use crate::gate::{AdmissionGate, GatePass};
use crate::pool::PoolAccess;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which arbitration strategy guards the critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// No arbitration; races are expected
    Unsynchronized,
    /// Mutual exclusion around the whole acquire-consume-release sequence
    Exclusive,
    /// At most `capacity` workers inside concurrently
    Counting {
        /// Gate slots
        capacity: usize,
    },
}

impl Arbitration {
    /// Pool access path that is correct (or, for `Unsynchronized`, deliberately
    /// incorrect) under this strategy
    ///
    /// Exclusive arbitration serializes the whole sequence, so plain reads and
    /// writes are sufficient. A counting gate admits several workers at once,
    /// so the pool itself must be atomic.
    #[must_use]
    pub const fn pool_access(self) -> PoolAccess {
        match self {
            Self::Unsynchronized => PoolAccess::Racy,
            Self::Exclusive => PoolAccess::Plain,
            Self::Counting { .. } => PoolAccess::Atomic,
        }
    }

    /// Whether the pool conservation invariant is guaranteed
    #[must_use]
    pub const fn conserves_pool(self) -> bool {
        !matches!(self, Self::Unsynchronized)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unsynchronized => "unsynchronized",
            Self::Exclusive => "exclusive",
            Self::Counting { .. } => "counting",
        }
    }
}

impl fmt::Display for Arbitration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counting { capacity } => write!(f, "counting({capacity})"),
            other => f.write_str(other.name()),
        }
    }
}

/// A single mutual-exclusion token
///
/// At most one [`ArbiterGuard`] exists at a time. The guard releases the token
/// on every exit path. If a holder panicked, the next caller still gets in:
/// the token carries no data that could be left half-updated.
#[derive(Default)]
pub struct ExclusiveArbiter {
    token: Mutex<()>,
    holders: AtomicUsize,
    peak: AtomicUsize,
}

impl ExclusiveArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other worker holds the arbiter, then take it
    pub fn enter(&self) -> ArbiterGuard<'_> {
        let token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.holders.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        ArbiterGuard {
            holders: &self.holders,
            _token: token,
        }
    }

    /// Whether some worker currently holds the arbiter
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.holders.load(Ordering::Acquire) > 0
    }

    /// Highest number of simultaneous holders ever observed (1 when correct)
    #[must_use]
    pub fn peak_holders(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// Scoped ownership of the [`ExclusiveArbiter`] token
pub struct ArbiterGuard<'a> {
    holders: &'a AtomicUsize,
    // Unlocked after the holder count is decremented in `drop`
    _token: MutexGuard<'a, ()>,
}

impl Drop for ArbiterGuard<'_> {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runtime form of an [`Arbitration`] strategy, shared by all workers
#[derive(Clone)]
pub enum Arbiter {
    Unsynchronized(Arc<Unguarded>),
    Exclusive(Arc<ExclusiveArbiter>),
    Counting(AdmissionGate),
}

/// Concurrency tracking for the unsynchronized strategy
///
/// Nothing is excluded; the counters only record how many workers overlapped.
#[derive(Default)]
pub struct Unguarded {
    inside: AtomicUsize,
    peak: AtomicUsize,
}

impl Arbiter {
    /// Build the shared arbiter for a strategy
    #[must_use]
    pub fn new(arbitration: Arbitration) -> Self {
        match arbitration {
            Arbitration::Unsynchronized => Self::Unsynchronized(Arc::default()),
            Arbitration::Exclusive => Self::Exclusive(Arc::new(ExclusiveArbiter::new())),
            Arbitration::Counting { capacity } => Self::Counting(AdmissionGate::new(capacity)),
        }
    }

    /// Enter the arbitrated region, blocking if the strategy requires it
    pub fn enter(&self) -> Admission<'_> {
        match self {
            Self::Unsynchronized(unguarded) => {
                let now = unguarded.inside.fetch_add(1, Ordering::AcqRel) + 1;
                unguarded.peak.fetch_max(now, Ordering::AcqRel);
                Admission::Unguarded(&unguarded.inside)
            }
            Self::Exclusive(arbiter) => Admission::Exclusive(arbiter.enter()),
            Self::Counting(gate) => Admission::Counting(gate.enter()),
        }
    }

    /// Highest number of workers simultaneously inside the region
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        match self {
            Self::Unsynchronized(unguarded) => unguarded.peak.load(Ordering::Acquire),
            Self::Exclusive(arbiter) => arbiter.peak_holders(),
            Self::Counting(gate) => gate.peak_admitted(),
        }
    }
}

/// A worker's presence inside the arbitrated region; leaving is `drop`
pub enum Admission<'a> {
    Unguarded(&'a AtomicUsize),
    Exclusive(ArbiterGuard<'a>),
    Counting(GatePass),
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if let Self::Unguarded(inside) = self {
            inside.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
