//! stdkit: async coordination toolkit
//!
//! This library bundles the [`stdkit_sync`] primitives (a single-resolution
//! [`Condition`] and a FIFO bounded-concurrency [`Semaphore`]) with a small
//! batch driver that throttles simulated jobs through a semaphore, as used by
//! the `stdkit` binary.

pub mod cli;
pub mod error;
pub mod progress;
pub mod throttle;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use progress::ProgressTracker;
pub use stdkit_sync::{
    wait_for_notification, Condition, ConditionNotifier, ProtocolViolation, Semaphore, SyncError,
};
pub use throttle::{run_batch, BatchConfig, BatchStats};
