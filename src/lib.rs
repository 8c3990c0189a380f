//! hotplate: bounded shared-resource arbitration between threads
//!
//! This library models a fixed pool of fungible units (hotplates) contended by
//! independent worker threads, and three ways of arbitrating that contention:
//! no arbitration (racy), exclusive mutual exclusion, and counting admission.

pub mod arbiter;
pub mod cli;
pub mod error;
pub mod gate;
pub mod pool;
pub mod progress;
pub mod simulation;
pub mod worker;

// Re-export commonly used types
pub use arbiter::{Arbiter, Arbitration, ExclusiveArbiter};
pub use error::{HotplateError, Result};
pub use gate::AdmissionGate;
pub use pool::{PoolAccess, ResourcePool};
pub use simulation::{run_trials, Simulation, SimulationConfig, SimulationReport};
pub use worker::{Worker, WorkerSpec, WorkerState};
