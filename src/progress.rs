//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the jobs of one batch
///
/// Cloning shares the underlying bar, so every worker can tick it.
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    /// A visible bar expecting `total_jobs` completions
    #[must_use]
    pub fn new(total_jobs: u64) -> Self {
        let pb = ProgressBar::new(total_jobs);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} jobs ({eta}) {msg}")
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("#>-"));
        pb.set_style(style);

        Self { progress_bar: pb }
    }

    /// A tracker that draws nothing
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            progress_bar: ProgressBar::hidden(),
        }
    }

    /// Count one finished job, flagging the bar if it failed
    pub fn job_finished(&self, failed: bool) {
        if failed {
            self.progress_bar.set_message("(with failures)");
        }
        self.progress_bar.inc(1);
    }

    /// Jobs counted so far
    #[must_use]
    pub fn finished_jobs(&self) -> u64 {
        self.progress_bar.position()
    }

    /// Stop the bar and leave it on screen
    pub fn finish(&self) {
        self.progress_bar.finish_with_message("Batch completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_tracker_counts_jobs() {
        let tracker = ProgressTracker::hidden();
        tracker.job_finished(false);
        tracker.clone().job_finished(true);
        assert_eq!(tracker.finished_jobs(), 2);
        tracker.finish();
    }
}
