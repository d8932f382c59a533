//! Error handling and types

use stdkit_sync::SyncError;
use thiserror::Error;

/// Errors raised by the batch driver and its configuration
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Synchronization primitive could not be built
    #[error("Synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// A simulated job reported failure
    #[error("Job {index} failed")]
    JobFailed {
        /// Position of the job in the batch
        index: usize,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
