//! stdkit: throttled batch runner
//!
//! Runs a batch of simulated jobs through a FIFO bounded-concurrency semaphore
//! and reports how the batch was admitted and how long it took.

use anyhow::{bail, Context, Result};
use clap::Parser;
use stdkit::cli::Args;
use stdkit::throttle::run_batch;
use stdkit::ProgressTracker;
use tracing::{info, Level};

#[compio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    let max_level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    let config = args.batch_config();
    info!("Starting stdkit v{}", env!("CARGO_PKG_VERSION"));
    info!("Limit: {}", config.limit);
    info!("Jobs: {}", config.jobs);
    info!("Delay per job: {:?}", config.delay);

    let tracker = args
        .progress
        .then(|| ProgressTracker::new(config.jobs as u64));
    let stats = run_batch(&config, tracker.as_ref())
        .await
        .context("Batch could not be started")?;

    if !args.quiet {
        println!("succeeded: {}", stats.succeeded);
        println!("failed: {}", stats.failed);
        println!("peak concurrency: {}", stats.peak_concurrency);
        println!("elapsed: {:?}", stats.duration);
    }

    if stats.failed > 0 {
        bail!("{} of {} jobs failed", stats.failed, config.jobs);
    }
    Ok(())
}
