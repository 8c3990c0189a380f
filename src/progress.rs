//! Progress tracking and reporting
//!
//! Workers announce each state transition as a [`WorkerEvent`]. Observers turn
//! those into console lines, progress bars, or a recorded log for tests.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// One state transition of one worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEvent {
    /// Worker identity
    pub worker: String,
    /// What happened
    pub kind: EventKind,
    /// Pool free units sampled right after the transition
    pub free_units: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Blocked on the arbiter or gate
    Waiting,
    /// Inside the arbitrated region, holding the initial grant
    Admitted { held_units: usize },
    /// One tick of consumption
    Progress {
        percent: f64,
        tick: u32,
        held_units: usize,
    },
    /// Reached 100 percent and returned its units
    Finished { ticks: u32, released: usize },
    /// Left the region with an error; units and slot were still returned
    Failed { error: String },
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker = &self.worker;
        match &self.kind {
            EventKind::Waiting => write!(f, "{worker} is waiting to enter"),
            EventKind::Admitted { held_units } => write!(
                f,
                "{worker} entered holding {held_units} units ({} free)",
                self.free_units
            ),
            EventKind::Progress {
                percent,
                tick,
                held_units,
            } => write!(
                f,
                "{worker} is at {percent:.1} percent after {tick} ticks ({held_units} units)"
            ),
            EventKind::Finished { ticks, released } => write!(
                f,
                "{worker} finished in {ticks} ticks and released {released} units ({} free)",
                self.free_units
            ),
            EventKind::Failed { error } => write!(f, "{worker} failed: {error}"),
        }
    }
}

/// Receives worker events; called concurrently from worker threads
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &WorkerEvent);
}

/// Prints one line per event to stdout
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_event(&self, event: &WorkerEvent) {
        println!("{event}");
    }
}

/// One progress bar per worker
pub struct ProgressObserver {
    _multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl ProgressObserver {
    /// Create bars for the given worker identities
    pub fn new<I, S>(workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template(
            "{prefix:>10.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        let bars = workers
            .into_iter()
            .map(|worker| {
                let worker = worker.into();
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(worker.clone());
                (worker, bar)
            })
            .collect();

        Self {
            _multi: multi,
            bars,
        }
    }
}

impl Observer for ProgressObserver {
    fn on_event(&self, event: &WorkerEvent) {
        let Some(bar) = self.bars.get(&event.worker) else {
            return;
        };

        match &event.kind {
            EventKind::Waiting => bar.set_message("waiting"),
            EventKind::Admitted { held_units } => {
                bar.set_message(format!("{held_units} units"));
            }
            EventKind::Progress {
                percent,
                tick,
                held_units,
            } => {
                // Saturating float-to-int cast; percent is never negative
                bar.set_position(percent.clamp(0.0, 100.0) as u64);
                bar.set_message(format!("tick {tick}, {held_units} units"));
            }
            EventKind::Finished { ticks, .. } => {
                bar.finish_with_message(format!("done in {ticks} ticks"));
            }
            EventKind::Failed { error } => bar.abandon_with_message(error.clone()),
        }
    }
}

/// Keeps every event in arrival order
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<WorkerEvent>>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events belonging to one worker
    #[must_use]
    pub fn events_for(&self, worker: &str) -> Vec<WorkerEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.worker == worker)
            .collect()
    }
}

impl Observer for EventRecorder {
    fn on_event(&self, event: &WorkerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> WorkerEvent {
        WorkerEvent {
            worker: "worker-1".to_string(),
            kind,
            free_units: 1,
        }
    }

    #[test]
    fn test_progress_line_format() {
        let line = event(EventKind::Progress {
            percent: 15.0,
            tick: 1,
            held_units: 3,
        })
        .to_string();
        assert_eq!(line, "worker-1 is at 15.0 percent after 1 ticks (3 units)");
    }

    #[test]
    fn test_progress_line_rounds_fractional_percent() {
        let line = event(EventKind::Progress {
            percent: 0.1 + 0.2,
            tick: 3,
            held_units: 1,
        })
        .to_string();
        assert_eq!(line, "worker-1 is at 0.3 percent after 3 ticks (1 units)");
    }

    #[test]
    fn test_finished_line_reports_free_units() {
        let line = event(EventKind::Finished {
            ticks: 7,
            released: 3,
        })
        .to_string();
        assert!(line.contains("finished in 7 ticks"));
        assert!(line.contains("(1 free)"));
    }

    #[test]
    fn test_recorder_filters_by_worker() {
        let recorder = EventRecorder::new();
        recorder.on_event(&event(EventKind::Waiting));
        recorder.on_event(&WorkerEvent {
            worker: "worker-2".to_string(),
            kind: EventKind::Waiting,
            free_units: 4,
        });

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.events_for("worker-2").len(), 1);
    }

    #[test]
    fn test_progress_observer_ignores_unknown_worker() {
        let observer = ProgressObserver::new(["worker-1"]);
        observer.on_event(&WorkerEvent {
            worker: "stranger".to_string(),
            kind: EventKind::Waiting,
            free_units: 0,
        });
        observer.on_event(&event(EventKind::Finished {
            ticks: 1,
            released: 0,
        }));
    }
}
