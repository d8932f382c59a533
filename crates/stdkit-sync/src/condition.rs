//! Single-resolution notification primitive
//!
//! A [`Condition`] carries exactly one result from a notifier to a waiter. The
//! two sides may arrive in either order:
//!
//! - **Notify first**: the result is parked in the condition and the later wait
//!   returns it without suspending.
//! - **Wait first**: the waiter suspends on a oneshot handle and the later notify
//!   resolves that handle.
//!
//! Either way exactly one notification is delivered and exactly one wait is
//! honored. Waiting twice, or hard-notifying twice, is a protocol violation and
//! panics.
//!
//! # Example
//!
//! ```rust
//! use stdkit_sync::Condition;
//!
//! # futures::executor::block_on(async {
//! let condition: Condition<u32> = Condition::new();
//! let notifier = condition.notifier();
//!
//! let result = condition
//!     .wait_for_notification(async move {
//!         notifier.succeed(42);
//!     })
//!     .await;
//!
//! assert_eq!(result.unwrap(), 42);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{self, Either};
use tracing::{trace, warn};

use crate::error::ProtocolViolation;

/// Lifecycle of one condition
///
/// Transitions, per (state, event):
///
/// | state         | wait                          | notify                         |
/// |---------------|-------------------------------|--------------------------------|
/// | `NotStarted`  | -> `AsyncResult`, suspend     | -> `SyncResult`, delivered     |
/// | `AsyncResult` | violation                     | send, -> `Finished`, delivered |
/// | `SyncResult`  | -> `Finished`, return result  | rejected                       |
/// | `Finished`    | violation                     | rejected                       |
enum ConditionState<T, E> {
    NotStarted,
    AsyncResult(oneshot::Sender<Result<T, E>>),
    SyncResult(Result<T, E>),
    Finished,
}

impl<T, E> ConditionState<T, E> {
    fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::AsyncResult(_) => "AsyncResult",
            Self::SyncResult(_) => "SyncResult",
            Self::Finished => "Finished",
        }
    }
}

/// What a waiter does after its wait event was applied
enum Wait<T, E> {
    Ready(Result<T, E>),
    Pending(oneshot::Receiver<Result<T, E>>),
}

/// A single-resolution notification box
///
/// Clones share the same state, so one clone can be handed to the producer
/// path while another waits. Use [`Condition::notifier`] to hand out a view
/// that can notify but never wait.
pub struct Condition<T, E = anyhow::Error> {
    state: Arc<Mutex<ConditionState<T, E>>>,
}

impl<T, E> Condition<T, E> {
    /// Create a condition that has been neither notified nor waited on
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConditionState::NotStarted)),
        }
    }

    /// Notify with a value
    ///
    /// # Panics
    ///
    /// Panics with [`ProtocolViolation::AlreadyNotified`] if the condition was
    /// already notified.
    pub fn succeed(&self, value: T) {
        self.notify(Ok(value));
    }

    /// Notify with a failure
    ///
    /// # Panics
    ///
    /// Panics with [`ProtocolViolation::AlreadyNotified`] if the condition was
    /// already notified.
    pub fn fail(&self, error: E) {
        self.notify(Err(error));
    }

    /// Notify with a value unless another notification got there first
    ///
    /// Returns `false`, leaving the delivered result untouched, if the
    /// condition was already notified.
    pub fn try_succeed(&self, value: T) -> bool {
        self.try_notify(Ok(value))
    }

    /// Notify with a failure unless another notification got there first
    ///
    /// Returns `false`, leaving the delivered result untouched, if the
    /// condition was already notified.
    pub fn try_fail(&self, error: E) -> bool {
        self.try_notify(Err(error))
    }

    /// Whether a notification has been delivered
    #[must_use]
    pub fn is_notified(&self) -> bool {
        match &*self.lock() {
            // Finished is reached only through a delivered notification
            ConditionState::SyncResult(_) | ConditionState::Finished => true,
            ConditionState::NotStarted | ConditionState::AsyncResult(_) => false,
        }
    }

    /// A handle that may notify this condition but not wait on it
    #[must_use]
    pub fn notifier(&self) -> ConditionNotifier<T, E> {
        ConditionNotifier {
            condition: self.clone(),
        }
    }

    /// Wait until the condition is notified, then return its result
    ///
    /// If a notification was already delivered the returned future resolves
    /// on its first poll without touching `notifiers`. Otherwise it suspends,
    /// polling `notifiers` alongside, until the notification arrives.
    ///
    /// `notifiers` must eventually cause this condition to be notified, either
    /// directly or by driving other work that does. This is not enforced: if
    /// it completes without a notification the waiter keeps waiting, and stays
    /// suspended forever if none ever comes. Once the notification arrives a
    /// still-pending `notifiers` future is dropped.
    ///
    /// The wait is registered when this method is called, not when the
    /// returned future is first polled.
    ///
    /// # Panics
    ///
    /// Panics with [`ProtocolViolation::AlreadyWaited`] if this condition was
    /// waited on before, whether or not that earlier wait has resolved.
    pub fn wait_for_notification<N>(&self, notifiers: N) -> impl Future<Output = Result<T, E>>
    where
        N: Future,
    {
        let wait = self.begin_wait();
        async move {
            match wait {
                Wait::Ready(result) => result,
                Wait::Pending(receiver) => drive(receiver, notifiers).await,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConditionState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_wait(&self) -> Wait<T, E> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, ConditionState::Finished) {
            ConditionState::NotStarted => {
                let (sender, receiver) = oneshot::channel();
                *state = ConditionState::AsyncResult(sender);
                Wait::Pending(receiver)
            }
            ConditionState::SyncResult(result) => Wait::Ready(result),
            ConditionState::AsyncResult(sender) => {
                // Keep the first waiter's handle alive before unwinding
                *state = ConditionState::AsyncResult(sender);
                drop(state);
                panic!("{}", ProtocolViolation::AlreadyWaited);
            }
            ConditionState::Finished => {
                drop(state);
                panic!("{}", ProtocolViolation::AlreadyWaited);
            }
        }
    }

    fn notify(&self, result: Result<T, E>) {
        if !self.try_notify(result) {
            panic!("{}", ProtocolViolation::AlreadyNotified);
        }
    }

    fn try_notify(&self, result: Result<T, E>) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, ConditionState::Finished) {
            ConditionState::NotStarted => {
                *state = ConditionState::SyncResult(result);
                true
            }
            ConditionState::AsyncResult(sender) => {
                drop(state);
                if sender.send(result).is_err() {
                    trace!("waiter dropped before its notification was delivered");
                }
                true
            }
            parked @ ConditionState::SyncResult(_) => {
                *state = parked;
                false
            }
            ConditionState::Finished => false,
        }
    }
}

impl<T, E> Default for Condition<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for Condition<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> fmt::Debug for Condition<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("state", &self.lock().name())
            .finish()
    }
}

/// Notifier-facing view of a [`Condition`]
///
/// Permits `succeed`, `fail`, `try_succeed` and `try_fail`, but not waiting.
pub struct ConditionNotifier<T, E = anyhow::Error> {
    condition: Condition<T, E>,
}

impl<T, E> ConditionNotifier<T, E> {
    /// See [`Condition::succeed`]
    ///
    /// # Panics
    ///
    /// Panics if the condition was already notified.
    pub fn succeed(&self, value: T) {
        self.condition.succeed(value);
    }

    /// See [`Condition::fail`]
    ///
    /// # Panics
    ///
    /// Panics if the condition was already notified.
    pub fn fail(&self, error: E) {
        self.condition.fail(error);
    }

    /// See [`Condition::try_succeed`]
    pub fn try_succeed(&self, value: T) -> bool {
        self.condition.try_succeed(value)
    }

    /// See [`Condition::try_fail`]
    pub fn try_fail(&self, error: E) -> bool {
        self.condition.try_fail(error)
    }
}

impl<T, E> Clone for ConditionNotifier<T, E> {
    fn clone(&self) -> Self {
        Self {
            condition: self.condition.clone(),
        }
    }
}

impl<T, E> fmt::Debug for ConditionNotifier<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionNotifier")
            .field("condition", &self.condition)
            .finish()
    }
}

/// Build a condition, let `f` start whatever will notify it, and wait
///
/// `f` receives a [`ConditionNotifier`] and returns the notifiers future that
/// is polled while waiting (see [`Condition::wait_for_notification`]).
///
/// # Example
///
/// ```rust
/// use stdkit_sync::wait_for_notification;
///
/// # futures::executor::block_on(async {
/// let greeting: anyhow::Result<String> = wait_for_notification(|notifier| async move {
///     notifier.succeed("hello".to_string());
/// })
/// .await;
///
/// assert_eq!(greeting.unwrap(), "hello");
/// # });
/// ```
pub async fn wait_for_notification<T, E, F, N>(f: F) -> Result<T, E>
where
    F: FnOnce(ConditionNotifier<T, E>) -> N,
    N: Future,
{
    let condition = Condition::new();
    let notifiers = f(condition.notifier());
    condition.wait_for_notification(notifiers).await
}

/// Poll `notifiers` until the notification lands in `receiver`
async fn drive<T, E, N>(receiver: oneshot::Receiver<Result<T, E>>, notifiers: N) -> Result<T, E>
where
    N: Future,
{
    let notifiers = pin!(notifiers);
    let delivered = match future::select(receiver, notifiers).await {
        Either::Left((delivered, _)) => delivered,
        Either::Right((_, mut receiver)) => match receiver.try_recv() {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                warn!("notifiers completed without notifying the condition; waiter remains suspended");
                receiver.await
            }
            Err(canceled) => Err(canceled),
        },
    };

    match delivered {
        Ok(result) => result,
        Err(oneshot::Canceled) => {
            // Every handle to the condition is gone, so nothing can notify it
            warn!("condition dropped without a notification; waiter remains suspended");
            future::pending().await
        }
    }
}
