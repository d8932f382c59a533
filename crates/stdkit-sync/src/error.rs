//! Error types for the synchronization primitives

use thiserror::Error;

/// Recoverable errors raised while building synchronization primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A semaphore was asked to admit zero concurrent calls
    #[error("Semaphore limit must be at least 1, got: {limit}")]
    InvalidLimit {
        /// The rejected limit
        limit: usize,
    },
}

/// Misuse of an exactly-once contract
///
/// These are programmer errors. They are never returned; the offending call
/// panics with the variant's message instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `wait_for_notification` was called a second time on one condition
    #[error("Condition has already been waited on")]
    AlreadyWaited,

    /// `succeed`/`fail` was called on a condition that was already notified
    #[error("Condition has already been notified")]
    AlreadyNotified,
}

pub type Result<T> = std::result::Result<T, SyncError>;
