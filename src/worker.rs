//! Worker execution loop
//!
//! Every scenario runs the same loop; only the [`Arbiter`] differs:
//!
//! 1. Enter the arbitrated region (may block)
//! 2. Acquire up to `needed_units` from the pool
//! 3. Each tick: sleep, advance progress by `held * per_unit_impact`, then
//!    top up from units freed by others
//! 4. At 100 percent: release every held unit, leave the region
//!
//! Units are held by a [`Lease`](crate::pool::Lease) and the region by an
//! [`Admission`](crate::arbiter::Admission). Both are dropped on every exit
//! path, units first, so a worker that fails mid-loop still returns what it
//! holds before the next worker is let in.

use crate::arbiter::Arbiter;
use crate::error::{HotplateError, Result};
use crate::pool::{PoolAccess, ResourcePool};
use crate::progress::{EventKind, Observer, WorkerEvent};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Static description of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Identity used in every console line
    pub id: String,
    /// Units this worker wants to hold at once
    pub needed_units: usize,
    /// Fail with [`HotplateError::WorkerFault`] when this tick is reached
    pub fail_at_tick: Option<u32>,
}

impl WorkerSpec {
    #[must_use]
    pub fn new(id: impl Into<String>, needed_units: usize) -> Self {
        Self {
            id: id.into(),
            needed_units,
            fail_at_tick: None,
        }
    }

    #[must_use]
    pub const fn with_fault_at(mut self, tick: u32) -> Self {
        self.fail_at_tick = Some(tick);
        self
    }
}

/// Lifecycle of a worker: `Waiting -> Admitted -> Finished | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Waiting,
    Admitted,
    Finished,
    Failed,
}

/// Final account of one worker's run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub id: String,
    pub needed_units: usize,
    /// Ticks spent inside the region
    pub ticks: u32,
    /// Percent complete, capped at 100
    pub progress: f64,
    pub state: WorkerState,
    /// Rendered error for `Failed` workers
    pub error: Option<String>,
}

/// Everything a worker shares with its peers
pub struct WorkerContext<'a> {
    pub pool: &'a ResourcePool,
    pub arbiter: &'a Arbiter,
    pub access: PoolAccess,
    pub observer: Option<&'a dyn Observer>,
    pub tick_interval: Duration,
    /// Percent gained per held unit per tick
    pub per_unit_impact: f64,
    /// Consecutive ticks holding zero units before giving up; `None` waits
    /// indefinitely, which is only safe when the pool cannot lose units
    pub stall_limit: Option<u32>,
}

impl WorkerContext<'_> {
    fn emit(&self, worker: &str, kind: EventKind) {
        let event = WorkerEvent {
            worker: worker.to_string(),
            kind,
            free_units: self.pool.free_units(),
        };

        match &event.kind {
            EventKind::Progress { .. } => debug!("{event}"),
            EventKind::Failed { .. } => warn!("{event}"),
            _ => info!("{event}"),
        }

        if let Some(observer) = self.observer {
            observer.on_event(&event);
        }
    }
}

/// One independent unit of execution contending for the pool
#[derive(Debug)]
pub struct Worker {
    spec: WorkerSpec,
    state: WorkerState,
    ticks: u32,
    progress: f64,
}

impl Worker {
    #[must_use]
    pub const fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            state: WorkerState::Waiting,
            ticks: 0,
            progress: 0.0,
        }
    }

    /// Run to completion (or failure) and report
    ///
    /// Failures are captured in the report rather than returned; the held
    /// units and the arbiter slot have already been released by then.
    #[must_use]
    pub fn run(mut self, ctx: &WorkerContext<'_>) -> WorkerReport {
        let error = match self.consume(ctx) {
            Ok(()) => None,
            Err(e) => {
                self.state = WorkerState::Failed;
                ctx.emit(
                    &self.spec.id,
                    EventKind::Failed {
                        error: e.to_string(),
                    },
                );
                Some(e.to_string())
            }
        };

        WorkerReport {
            id: self.spec.id,
            needed_units: self.spec.needed_units,
            ticks: self.ticks,
            progress: self.progress,
            state: self.state,
            error,
        }
    }

    fn consume(&mut self, ctx: &WorkerContext<'_>) -> Result<()> {
        let needed = self.spec.needed_units;
        ctx.emit(&self.spec.id, EventKind::Waiting);

        // Declared before the lease so it is dropped after it
        let _admission = ctx.arbiter.enter();
        self.state = WorkerState::Admitted;

        let mut lease = ctx.pool.lease(ctx.access);
        lease.top_up(needed);
        ctx.emit(
            &self.spec.id,
            EventKind::Admitted {
                held_units: lease.held(),
            },
        );

        let mut idle_ticks = 0;
        while self.progress < 100.0 {
            thread::sleep(ctx.tick_interval);
            self.ticks += 1;

            if self.spec.fail_at_tick == Some(self.ticks) {
                return Err(HotplateError::WorkerFault {
                    worker: self.spec.id.clone(),
                    tick: self.ticks,
                });
            }

            let held = lease.held();
            if held > 0 {
                idle_ticks = 0;
                #[allow(clippy::cast_precision_loss)]
                let gained = held as f64 * ctx.per_unit_impact;
                self.progress = (self.progress + gained).min(100.0);
                ctx.emit(
                    &self.spec.id,
                    EventKind::Progress {
                        percent: self.progress,
                        tick: self.ticks,
                        held_units: held,
                    },
                );
            } else {
                idle_ticks += 1;
                if ctx.stall_limit.is_some_and(|limit| idle_ticks >= limit) {
                    return Err(HotplateError::Starved {
                        worker: self.spec.id.clone(),
                        ticks: idle_ticks,
                    });
                }
            }

            lease.top_up(needed);
        }

        let released = lease.release_all();
        self.state = WorkerState::Finished;
        ctx.emit(
            &self.spec.id,
            EventKind::Finished {
                ticks: self.ticks,
                released,
            },
        );

        Ok(())
    }
}
