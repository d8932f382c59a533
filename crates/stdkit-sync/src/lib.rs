//! Async coordination primitives
//!
//! This crate provides two small building blocks for cooperative async code.
//! They are runtime-agnostic; the tests and the `stdkit` binary drive them on
//! [compio](https://github.com/compio-rs/compio).
//!
//! # Primitives
//!
//! - [`Condition`] - single-resolution notification, tolerant of notify/wait in either order
//! - [`Semaphore`] - bounded-concurrency limiter with FIFO admission
//!
//! # Example
//!
//! ```rust,no_run
//! use stdkit_sync::Semaphore;
//!
//! #[compio::main]
//! async fn main() {
//!     let sem = Semaphore::new(100, |i: usize| async move {
//!         println!("Task {}", i);
//!         i
//!     })
//!     .unwrap();
//!
//!     // 1000 calls, but only 100 run concurrently
//!     let results = sem.run_all(0..1000).await;
//!     assert_eq!(results.len(), 1000);
//! }
//! ```

mod condition;
mod error;
mod semaphore;

pub use condition::{wait_for_notification, Condition, ConditionNotifier};
pub use error::{ProtocolViolation, Result, SyncError};
pub use semaphore::Semaphore;
