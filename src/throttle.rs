//! Throttled batch execution
//!
//! This module drives a batch of simulated jobs through a [`Semaphore`] and
//! reports what happened. Each job sleeps for the configured delay and then
//! succeeds with its own index, unless it was listed to fail.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stdkit::throttle::{run_batch, BatchConfig};
//! use std::collections::BTreeSet;
//! use std::time::Duration;
//!
//! #[compio::main]
//! async fn main() -> stdkit::Result<()> {
//!     let config = BatchConfig {
//!         limit: 2,
//!         jobs: 5,
//!         delay: Duration::from_millis(10),
//!         fail_on: BTreeSet::new(),
//!     };
//!     let stats = run_batch(&config, None).await?;
//!     println!("{} jobs succeeded in {:?}", stats.succeeded, stats.duration);
//!     Ok(())
//! }
//! ```

use crate::error::{AppError, Result};
use crate::progress::ProgressTracker;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};
use stdkit_sync::Semaphore;
use tracing::{debug, info, warn};

/// Shape of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum jobs running at once
    pub limit: usize,
    /// Number of jobs, indexed `0..jobs`
    pub jobs: usize,
    /// Simulated work per job
    pub delay: Duration,
    /// Indices of jobs that fail
    pub fail_on: BTreeSet<usize>,
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// Jobs that returned their value
    pub succeeded: usize,

    /// Jobs that failed
    pub failed: usize,

    /// Highest number of jobs observed running at the same time
    pub peak_concurrency: usize,

    /// Wall-clock time for the whole batch
    pub duration: Duration,
}

/// Running-job counter shared by every worker invocation
#[derive(Clone, Default)]
struct Occupancy {
    active: Rc<Cell<usize>>,
    peak: Rc<Cell<usize>>,
}

impl Occupancy {
    fn enter(&self) -> OccupancyGuard {
        let now = self.active.get() + 1;
        self.active.set(now);
        self.peak.set(self.peak.get().max(now));
        OccupancyGuard(Rc::clone(&self.active))
    }
}

struct OccupancyGuard(Rc<Cell<usize>>);

impl Drop for OccupancyGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Run every job of `config` through a semaphore of `config.limit` slots
///
/// Job failures are counted in the returned stats, not returned as errors.
///
/// # Errors
///
/// Returns [`AppError::Sync`] if the semaphore cannot be built (a limit of 0).
pub async fn run_batch(config: &BatchConfig, progress: Option<&ProgressTracker>) -> Result<BatchStats> {
    let occupancy = Occupancy::default();
    let fail_on = Rc::new(config.fail_on.clone());
    let delay = config.delay;
    let tracker = progress.cloned();

    let worker_occupancy = occupancy.clone();
    let semaphore = Semaphore::new(config.limit, move |index: usize| {
        let occupancy = worker_occupancy.clone();
        let fail_on = Rc::clone(&fail_on);
        let tracker = tracker.clone();
        async move {
            let _running = occupancy.enter();
            debug!(job = index, "job started");
            compio::time::sleep(delay).await;

            let failed = fail_on.contains(&index);
            if let Some(tracker) = &tracker {
                tracker.job_finished(failed);
            }
            if failed {
                Err(AppError::JobFailed { index })
            } else {
                Ok(index)
            }
        }
    })?;

    info!(
        "Running {} jobs with at most {} at once",
        config.jobs, config.limit
    );
    let start = Instant::now();
    let results = semaphore.run_all(0..config.jobs).await;
    let duration = start.elapsed();

    let mut succeeded = 0;
    let mut failed = 0;
    for result in results {
        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                warn!("{e}");
                failed += 1;
            }
        }
    }

    if let Some(tracker) = progress {
        tracker.finish();
    }

    Ok(BatchStats {
        succeeded,
        failed,
        peak_concurrency: occupancy.peak.get(),
        duration,
    })
}
