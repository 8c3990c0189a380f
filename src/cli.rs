//! Command-line interface definitions

use crate::arbiter::Arbitration;
use crate::simulation::{FaultPlan, SimulationConfig};
use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;

/// Simulate workers contending for a bounded pool of shared hotplates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// How workers are arbitrated around the critical section
    ///
    /// `unsynchronized` lets every worker race on the pool and exists only to
    /// demonstrate lost updates. `exclusive` admits one worker at a time.
    /// `counting` admits up to `--gate-capacity` workers at a time.
    #[arg(long, value_enum, default_value = "exclusive")]
    pub arbitration: ArbitrationKind,

    /// Maximum concurrent admissions for `--arbitration counting`
    #[arg(long, default_value = "3")]
    pub gate_capacity: usize,

    /// Pool capacity (total hotplates)
    #[arg(long, default_value = "4")]
    pub total_units: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "4")]
    pub workers: usize,

    /// Units requested by each worker
    #[arg(long, default_value = "3")]
    pub demand: usize,

    /// Per-worker demand overrides, comma separated (e.g. `3,2,4`)
    ///
    /// Entry N applies to worker N; workers without an entry use `--demand`.
    #[arg(long, value_delimiter = ',')]
    pub demands: Vec<usize>,

    /// Simulated tick length in milliseconds
    #[arg(long, default_value = "100")]
    pub tick_ms: u64,

    /// Percent of progress gained per held unit per tick
    #[arg(long, default_value = "5.0")]
    pub impact: f64,

    /// Consecutive ticks without units before an unsynchronized worker gives up
    #[arg(long, default_value = "1000")]
    pub stall_limit: u32,

    /// Fail worker N at tick T, given as `N:T` (workers are numbered from 1)
    #[arg(long, value_name = "WORKER:TICK", value_parser = parse_fault)]
    pub inject_fault: Option<FaultPlan>,

    /// Run the scenario this many times and report conservation violations
    #[arg(long, default_value = "1")]
    pub trials: usize,

    /// Show progress bars instead of one line per event
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arbitration strategy names accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArbitrationKind {
    /// No arbitration (demonstrates the race)
    Unsynchronized,
    /// One worker at a time
    Exclusive,
    /// Up to `--gate-capacity` workers at a time
    Counting,
}

fn parse_fault(s: &str) -> std::result::Result<FaultPlan, String> {
    let (worker, tick) = s
        .split_once(':')
        .ok_or_else(|| format!("expected WORKER:TICK, got {s}"))?;
    let worker: usize = worker
        .trim()
        .parse()
        .map_err(|e| format!("invalid worker number {worker}: {e}"))?;
    let tick: u32 = tick
        .trim()
        .parse()
        .map_err(|e| format!("invalid tick {tick}: {e}"))?;

    if worker == 0 {
        return Err("workers are numbered from 1".to_string());
    }

    Ok(FaultPlan {
        worker: worker - 1,
        tick,
    })
}

impl Args {
    /// Validate arguments that clap cannot check on its own
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending option.
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            bail!("Trials must be at least 1");
        }

        if self.progress && self.trials > 1 {
            bail!("--progress cannot be combined with --trials");
        }

        self.to_config().validate()?;
        Ok(())
    }

    #[must_use]
    pub const fn effective_arbitration(&self) -> Arbitration {
        match self.arbitration {
            ArbitrationKind::Unsynchronized => Arbitration::Unsynchronized,
            ArbitrationKind::Exclusive => Arbitration::Exclusive,
            ArbitrationKind::Counting => Arbitration::Counting {
                capacity: self.gate_capacity,
            },
        }
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Build the simulation configuration these arguments describe
    #[must_use]
    pub fn to_config(&self) -> SimulationConfig {
        SimulationConfig {
            total_units: self.total_units,
            worker_count: self.workers,
            per_worker_demand: self.demand,
            demand_overrides: self.demands.clone(),
            arbitration: self.effective_arbitration(),
            tick_interval: self.tick_interval(),
            per_unit_impact: self.impact,
            stall_limit: self.stall_limit,
            fault: self.inject_fault,
        }
    }
}
