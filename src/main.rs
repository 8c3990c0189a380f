//! hotplate: watch workers contend for a bounded pool of shared units
//!
//! Runs one scenario (or many trials of it) and prints one line per worker
//! state transition, followed by the final state of the pool.

use anyhow::{Context, Result};
use clap::Parser;
use hotplate::cli::Args;
use hotplate::progress::{ConsoleObserver, Observer, ProgressObserver};
use hotplate::simulation::{run_trials, Simulation};
use std::sync::Arc;
use tracing::{info, Level};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    if args.quiet {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match args.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(args.verbose > 1)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Starting hotplate v{}", env!("CARGO_PKG_VERSION"));

    // Validate arguments
    args.validate().context("Invalid arguments")?;
    let config = args.to_config();

    info!("Arbitration: {}", config.arbitration);
    info!("Total units: {}", config.total_units);
    info!("Workers: {}", config.worker_count);
    info!("Tick interval: {:?}", config.tick_interval);

    if args.trials > 1 {
        let summary = run_trials(&config, args.trials).context("Trial run failed")?;
        if !args.quiet {
            println!(
                "{} trials under {}: {} conservation violations, {} with failed workers, worst drift {:+}",
                summary.runs,
                config.arbitration,
                summary.violations,
                summary.runs_with_failures,
                summary.worst_drift
            );
        }
        return Ok(());
    }

    let mut simulation = Simulation::new(config);
    if !args.quiet {
        let observer: Arc<dyn Observer> = if args.progress {
            let ids = simulation.config().worker_specs().into_iter().map(|spec| spec.id);
            Arc::new(ProgressObserver::new(ids))
        } else {
            Arc::new(ConsoleObserver)
        };
        simulation = simulation.with_observer(observer);
    }

    let report = simulation.run().context("Simulation failed")?;

    if !args.quiet {
        println!(
            "Pool: {} of {} units free (drift {:+}), peak concurrency {}, elapsed {:?}",
            report.final_free_units,
            report.total_units,
            report.drift(),
            report.peak_concurrency,
            report.elapsed
        );
        for worker in report.failed() {
            if let Some(error) = &worker.error {
                println!("{}: {error}", worker.id);
            }
        }
    }

    Ok(())
}
