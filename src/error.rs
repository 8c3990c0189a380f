//! Error handling and types

use thiserror::Error;

/// Errors raised while configuring or running a simulation
///
/// The resource pool itself never fails; it saturates at its bounds. Every
/// variant here comes from configuration, a worker, or the thread runtime.
#[derive(Error, Debug)]
pub enum HotplateError {
    /// Standard I/O error (thread spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A fault was injected into a worker mid-run
    #[error("Worker {worker} faulted at tick {tick}")]
    WorkerFault {
        /// Worker identity
        worker: String,
        /// Tick at which the fault fired
        tick: u32,
    },

    /// A worker held no units for too many consecutive ticks
    #[error("Worker {worker} starved: no units acquired for {ticks} consecutive ticks")]
    Starved {
        /// Worker identity
        worker: String,
        /// Consecutive ticks spent holding nothing
        ticks: u32,
    },

    /// A worker thread panicked
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, HotplateError>;
