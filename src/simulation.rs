//! Scenario orchestration
//!
//! This module launches a fixed set of workers on real OS threads, lets them
//! contend for one [`ResourcePool`] under a chosen [`Arbitration`] strategy, and
//! reports the final pool state alongside each worker's outcome.
//!
//! # Architecture
//!
//! The run follows these phases:
//! 1. **Validation**: reject configurations that cannot run
//! 2. **Launch**: spawn one named thread per worker; all of them are held at a
//!    start line so they hit the pool at the same instant
//! 3. **Execution**: each worker runs the shared loop in [`crate::worker`]
//! 4. **Completion**: join every thread and compare free units to capacity
//!
//! # Usage
//!
//! ```rust,no_run
//! use hotplate::arbiter::Arbitration;
//! use hotplate::simulation::{Simulation, SimulationConfig};
//!
//! let config = SimulationConfig {
//!     arbitration: Arbitration::Exclusive,
//!     ..SimulationConfig::default()
//! };
//! let report = Simulation::new(config).run()?;
//! assert!(report.is_conserved());
//! # Ok::<(), hotplate::HotplateError>(())
//! ```

use crate::arbiter::{Arbiter, Arbitration};
use crate::error::{HotplateError, Result};
use crate::pool::ResourcePool;
use crate::progress::Observer;
use crate::worker::{Worker, WorkerContext, WorkerReport, WorkerSpec, WorkerState};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Inject a fault into one worker at a given tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    /// Zero-based worker index
    pub worker: usize,
    /// Tick (1-based) at which the worker fails
    pub tick: u32,
}

/// Launch-time configuration of a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Pool capacity
    pub total_units: usize,
    /// Number of concurrent workers
    pub worker_count: usize,
    /// Units requested by each worker unless overridden
    pub per_worker_demand: usize,
    /// Per-worker demand, by index; workers past the end use `per_worker_demand`
    pub demand_overrides: Vec<usize>,
    /// Strategy guarding the critical section (carries the gate capacity)
    pub arbitration: Arbitration,
    /// Simulated time granularity
    pub tick_interval: Duration,
    /// Percent of progress per held unit per tick
    pub per_unit_impact: f64,
    /// Consecutive idle ticks before a worker reports starvation; applied
    /// only under arbitration that can lose units
    pub stall_limit: u32,
    pub fault: Option<FaultPlan>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_units: 4,
            worker_count: 4,
            per_worker_demand: 3,
            demand_overrides: Vec::new(),
            arbitration: Arbitration::Exclusive,
            tick_interval: Duration::from_millis(100),
            per_unit_impact: 5.0,
            stall_limit: 1000,
            fault: None,
        }
    }
}

impl SimulationConfig {
    /// Check that the scenario can run
    ///
    /// # Errors
    ///
    /// Returns [`HotplateError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.total_units == 0 {
            return Err(HotplateError::InvalidConfig(
                "Total units must be at least 1".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(HotplateError::InvalidConfig(
                "Worker count must be at least 1".to_string(),
            ));
        }

        if self.per_worker_demand == 0 || self.demand_overrides.contains(&0) {
            return Err(HotplateError::InvalidConfig(
                "Worker demand must be at least 1 unit".to_string(),
            ));
        }

        if self.demand_overrides.len() > self.worker_count {
            return Err(HotplateError::InvalidConfig(format!(
                "{} demands given for {} workers",
                self.demand_overrides.len(),
                self.worker_count
            )));
        }

        if let Arbitration::Counting { capacity: 0 } = self.arbitration {
            return Err(HotplateError::InvalidConfig(
                "Gate capacity must be at least 1".to_string(),
            ));
        }

        if !(self.per_unit_impact.is_finite() && self.per_unit_impact > 0.0) {
            return Err(HotplateError::InvalidConfig(format!(
                "Per-unit impact must be a positive number, got {}",
                self.per_unit_impact
            )));
        }

        if self.stall_limit == 0 {
            return Err(HotplateError::InvalidConfig(
                "Stall limit must be at least 1 tick".to_string(),
            ));
        }

        if let Some(fault) = self.fault {
            if fault.worker >= self.worker_count {
                return Err(HotplateError::InvalidConfig(format!(
                    "Fault targets worker {} but only {} workers exist",
                    fault.worker, self.worker_count
                )));
            }
            if fault.tick == 0 {
                return Err(HotplateError::InvalidConfig(
                    "Fault tick must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Demand of the worker at `index`
    #[must_use]
    pub fn demand_for(&self, index: usize) -> usize {
        self.demand_overrides
            .get(index)
            .copied()
            .unwrap_or(self.per_worker_demand)
    }

    /// Worker descriptions, named `worker-1` .. `worker-N`
    #[must_use]
    pub fn worker_specs(&self) -> Vec<WorkerSpec> {
        (0..self.worker_count)
            .map(|index| {
                let spec = WorkerSpec::new(format!("worker-{}", index + 1), self.demand_for(index));
                match self.fault {
                    Some(fault) if fault.worker == index => spec.with_fault_at(fault.tick),
                    _ => spec,
                }
            })
            .collect()
    }

    /// Total units all workers would like to hold at once
    #[must_use]
    pub fn total_demand(&self) -> usize {
        (0..self.worker_count).map(|i| self.demand_for(i)).sum()
    }
}

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub arbitration: Arbitration,
    pub total_units: usize,
    /// Free units after every worker thread has exited
    pub final_free_units: usize,
    /// Per-worker outcome, in launch order
    pub workers: Vec<WorkerReport>,
    /// Most workers ever inside the arbitrated region at once
    pub peak_concurrency: usize,
    pub elapsed: Duration,
}

impl SimulationReport {
    /// Whether the pool ended with exactly its capacity free
    #[must_use]
    pub const fn is_conserved(&self) -> bool {
        self.final_free_units == self.total_units
    }

    /// Signed difference between final free units and capacity
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn drift(&self) -> i64 {
        self.final_free_units as i64 - self.total_units as i64
    }

    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.workers
            .iter()
            .all(|worker| worker.state == WorkerState::Finished)
    }

    #[must_use]
    pub fn failed(&self) -> Vec<&WorkerReport> {
        self.workers
            .iter()
            .filter(|worker| worker.state == WorkerState::Failed)
            .collect()
    }
}

/// A configured scenario, ready to run
pub struct Simulation {
    config: SimulationConfig,
    observer: Option<Arc<dyn Observer>>,
}

impl Simulation {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Forward every worker event to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run every worker to completion on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a thread cannot be
    /// spawned, or a worker thread panics. Worker faults and starvation are
    /// not errors here; they are recorded in the report.
    pub fn run(&self) -> Result<SimulationReport> {
        let config = &self.config;
        config.validate()?;

        if !config.arbitration.conserves_pool() && num_cpus::get() < 2 {
            warn!("Only one CPU available; unsynchronized races will be rare");
        }

        let pool = ResourcePool::new(config.total_units);
        let arbiter = Arbiter::new(config.arbitration);
        let ctx = WorkerContext {
            pool: &pool,
            arbiter: &arbiter,
            access: config.arbitration.pool_access(),
            observer: self.observer.as_deref(),
            tick_interval: config.tick_interval,
            per_unit_impact: config.per_unit_impact,
            stall_limit: (!config.arbitration.conserves_pool())
                .then_some(config.stall_limit),
        };
        let specs = config.worker_specs();
        let start_line = RwLock::new(());

        info!(
            "Starting {} workers under {} arbitration ({} units, demand {})",
            specs.len(),
            config.arbitration,
            config.total_units,
            config.total_demand()
        );

        let start = Instant::now();
        let workers = thread::scope(|scope| -> Result<Vec<WorkerReport>> {
            // Workers park on the read side until every thread has been spawned
            let hold = start_line.write().unwrap_or_else(PoisonError::into_inner);
            let mut handles = Vec::with_capacity(specs.len());
            for spec in specs {
                let ctx = &ctx;
                let start_line = &start_line;
                let handle = thread::Builder::new()
                    .name(spec.id.clone())
                    .spawn_scoped(scope, move || {
                        drop(start_line.read().unwrap_or_else(PoisonError::into_inner));
                        Worker::new(spec).run(ctx)
                    })?;
                handles.push(handle);
            }
            drop(hold);

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|panic| HotplateError::WorkerPanicked(panic_message(&*panic)))
                })
                .collect()
        })?;

        let report = SimulationReport {
            arbitration: config.arbitration,
            total_units: config.total_units,
            final_free_units: pool.free_units(),
            workers,
            peak_concurrency: arbiter.peak_concurrency(),
            elapsed: start.elapsed(),
        };

        if report.is_conserved() {
            info!(
                "All workers done in {:?}: {} of {} units free",
                report.elapsed, report.final_free_units, report.total_units
            );
        } else {
            warn!(
                "Conservation violated: {} units free, expected {} (drift {:+})",
                report.final_free_units,
                report.total_units,
                report.drift()
            );
        }

        Ok(report)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Aggregate of repeated runs of one scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialSummary {
    pub runs: usize,
    /// Runs whose final free units differed from capacity
    pub violations: usize,
    /// Runs where at least one worker failed
    pub runs_with_failures: usize,
    /// Largest absolute drift seen
    pub worst_drift: i64,
}

impl TrialSummary {
    fn record(&mut self, report: &SimulationReport) {
        self.runs += 1;
        if !report.is_conserved() {
            self.violations += 1;
        }
        if !report.all_finished() {
            self.runs_with_failures += 1;
        }
        if report.drift().abs() > self.worst_drift.abs() {
            self.worst_drift = report.drift();
        }
    }
}

/// Run the same scenario `trials` times and count conservation violations
///
/// # Errors
///
/// Propagates the first error from [`Simulation::run`].
pub fn run_trials(config: &SimulationConfig, trials: usize) -> Result<TrialSummary> {
    let mut summary = TrialSummary::default();
    for trial in 1..=trials {
        let report = Simulation::new(config.clone()).run()?;
        info!(trial, drift = report.drift(), "trial complete");
        summary.record(&report);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(arbitration: Arbitration) -> SimulationConfig {
        SimulationConfig {
            arbitration,
            tick_interval: Duration::from_millis(1),
            stall_limit: 50,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_reference_scenario() {
        let config = SimulationConfig::default();
        assert_eq!(config.total_units, 4);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.per_worker_demand, 3);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            SimulationConfig {
                total_units: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                worker_count: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                per_worker_demand: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                demand_overrides: vec![1, 2, 3, 4, 5],
                ..SimulationConfig::default()
            },
            SimulationConfig {
                arbitration: Arbitration::Counting { capacity: 0 },
                ..SimulationConfig::default()
            },
            SimulationConfig {
                per_unit_impact: f64::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                stall_limit: 0,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                fault: Some(FaultPlan { worker: 4, tick: 1 }),
                ..SimulationConfig::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(HotplateError::InvalidConfig(_))),
                "expected rejection for {config:?}"
            );
        }
    }

    #[test]
    fn test_heterogeneous_demand() {
        let config = SimulationConfig {
            demand_overrides: vec![1, 2],
            ..SimulationConfig::default()
        };
        let demands: Vec<usize> = config
            .worker_specs()
            .iter()
            .map(|spec| spec.needed_units)
            .collect();
        assert_eq!(demands, vec![1, 2, 3, 3]);
        assert_eq!(config.total_demand(), 9);
    }

    #[test]
    fn test_fault_plan_targets_one_worker() {
        let config = SimulationConfig {
            fault: Some(FaultPlan { worker: 1, tick: 3 }),
            ..SimulationConfig::default()
        };
        let specs = config.worker_specs();
        assert_eq!(specs[0].fail_at_tick, None);
        assert_eq!(specs[1].fail_at_tick, Some(3));
        assert_eq!(specs[1].id, "worker-2");
    }

    #[test]
    fn test_exclusive_run_conserves() {
        let report = Simulation::new(fast(Arbitration::Exclusive)).run().unwrap();
        assert!(report.is_conserved());
        assert!(report.all_finished());
        assert_eq!(report.drift(), 0);
        assert_eq!(report.peak_concurrency, 1);
        assert_eq!(report.workers.len(), 4);
    }

    #[test]
    fn test_invalid_config_fails_before_launch() {
        let config = SimulationConfig {
            worker_count: 0,
            ..fast(Arbitration::Exclusive)
        };
        assert!(Simulation::new(config).run().is_err());
    }

    #[test]
    fn test_trial_summary_counts_runs() {
        let summary = run_trials(&fast(Arbitration::Counting { capacity: 2 }), 3).unwrap();
        assert_eq!(summary.runs, 3);
        assert_eq!(summary.violations, 0);
        assert_eq!(summary.worst_drift, 0);
    }
}
