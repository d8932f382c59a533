//! Command-line interface definitions

use crate::error::{AppError, Result};
use crate::throttle::BatchConfig;
use clap::Parser;
use std::time::Duration;

/// Upper bound on jobs per batch
const MAX_JOBS: usize = 1_000_000;

/// Upper bound on simulated work per job
const MAX_DELAY_MS: u64 = 60_000;

/// Run a batch of simulated jobs through a FIFO bounded-concurrency semaphore
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Maximum jobs running at once (0 = number of CPU cores)
    ///
    /// Jobs beyond the limit queue up and start strictly in submission order
    /// as running jobs finish.
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Number of jobs in the batch
    #[arg(long, default_value = "16")]
    pub jobs: usize,

    /// Simulated work per job, in milliseconds
    #[arg(long, default_value = "50")]
    pub delay_ms: u64,

    /// Index of a job that fails instead of succeeding (repeatable)
    #[arg(long, value_name = "INDEX")]
    pub fail_on: Vec<usize>,

    /// Show progress information
    #[arg(long)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] if:
    /// - `--jobs` is 0 or above the supported maximum
    /// - `--delay-ms` is above the supported maximum
    /// - a `--fail-on` index does not name a job in the batch
    /// - `--quiet` and `--verbose` are both given
    pub fn validate(&self) -> Result<()> {
        if self.jobs < 1 || self.jobs > MAX_JOBS {
            return Err(AppError::InvalidConfig(format!(
                "Jobs must be between 1 and {MAX_JOBS}, got: {}",
                self.jobs
            )));
        }

        if self.delay_ms > MAX_DELAY_MS {
            return Err(AppError::InvalidConfig(format!(
                "Delay must be at most {MAX_DELAY_MS} ms, got: {}",
                self.delay_ms
            )));
        }

        if let Some(index) = self.fail_on.iter().find(|&&index| index >= self.jobs) {
            return Err(AppError::InvalidConfig(format!(
                "--fail-on index {index} is outside the batch of {} jobs",
                self.jobs
            )));
        }

        if self.quiet && self.verbose > 0 {
            return Err(AppError::InvalidConfig(
                "Cannot use both --quiet and --verbose options".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the actual concurrency limit to use
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            num_cpus::get()
        } else {
            self.limit
        }
    }

    /// Build the batch described by these arguments
    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            limit: self.effective_limit(),
            jobs: self.jobs,
            delay: Duration::from_millis(self.delay_ms),
            fail_on: self.fail_on.iter().copied().collect(),
        }
    }
}
