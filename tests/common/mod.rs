//! Shared helpers for integration tests

#![allow(dead_code)]

use hotplate::arbiter::Arbitration;
use hotplate::simulation::SimulationConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Watchdog that aborts the test binary if a scenario outlives `limit`
///
/// A deadlocked arbiter or gate would otherwise hang every remaining test.
/// The abort message names the test thread that armed the watchdog.
pub struct DeadlockWatchdog {
    disarmed: Arc<AtomicBool>,
}

impl Drop for DeadlockWatchdog {
    fn drop(&mut self) {
        self.disarmed.store(true, Ordering::SeqCst);
    }
}

pub fn test_timeout_guard(limit: Duration) -> DeadlockWatchdog {
    let disarmed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&disarmed);
    let scenario = thread::current()
        .name()
        .unwrap_or("unnamed scenario")
        .to_string();

    thread::Builder::new()
        .name("deadlock-watchdog".to_string())
        .spawn(move || {
            thread::sleep(limit);
            if !flag.load(Ordering::SeqCst) {
                eprintln!(
                    "{scenario} still running after {limit:?}; an arbiter or gate is likely deadlocked"
                );
                std::process::abort();
            }
        })
        .expect("spawn deadlock watchdog");

    DeadlockWatchdog { disarmed }
}

/// The reference scenario with a short tick so tests stay fast
pub fn fast_config(arbitration: Arbitration) -> SimulationConfig {
    SimulationConfig {
        arbitration,
        tick_interval: Duration::from_millis(2),
        stall_limit: 100,
        ..SimulationConfig::default()
    }
}
