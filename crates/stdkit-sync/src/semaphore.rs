//! Bounded-concurrency limiter with FIFO admission
//!
//! A [`Semaphore`] wraps a worker function and throttles calls to it so that
//! at most `limit` worker invocations execute at once. Callers that find every
//! slot taken queue up behind a [`Condition`] and are released strictly in
//! arrival order as running calls finish.
//!
//! # Example
//!
//! ```rust,no_run
//! use stdkit_sync::Semaphore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), stdkit_sync::SyncError> {
//! let sem = Semaphore::new(2, |job: u32| async move {
//!     compio::time::sleep(Duration::from_millis(10)).await;
//!     job * 2
//! })?;
//!
//! // Five calls, never more than two workers at a time
//! let doubled = sem.run_all(0..5).await;
//! assert_eq!(doubled, vec![0, 2, 4, 6, 8]);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use futures::future::join_all;
use tracing::{debug, trace};

use crate::condition::Condition;
use crate::error::{Result, SyncError};

/// Wake-up signal handed to a queued caller when a slot frees up
type Admission = Condition<(), Infallible>;

/// A FIFO semaphore that owns the work it throttles
///
/// # Design
///
/// - **One lock, never held across `.await`**: every check is paired with its
///   mutation inside a single critical section
/// - **FIFO waiters**: blocked callers are released oldest-first
/// - **Slot reservation**: a released caller keeps its slot until it resumes,
///   so late arrivals cannot overtake it
/// - **Drop-safe**: a `run` future dropped at any point gives back whatever
///   it held
/// - **Cloneable**: clones share one set of counters and one queue
///
/// Worker failures are ordinary outputs. A worker returning `Result` hands its
/// `Err` to the one caller that issued it; nothing else is affected.
pub struct Semaphore<F> {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner<F>>,
}

struct SemaphoreInner<F> {
    /// Maximum concurrent worker invocations
    limit: usize,
    /// The throttled function
    worker: F,
    /// Counters, queue and in-flight tracking
    state: Mutex<SemaphoreState>,
}

#[derive(Default)]
struct SemaphoreState {
    /// Worker invocations currently executing
    running: usize,
    /// Slots promised to released callers that have not resumed yet
    reserved: usize,
    /// Callers waiting for a slot, oldest first
    blocked: VecDeque<(u64, Admission)>,
    /// Source of call ids, unique per semaphore
    next_id: u64,
    /// Calls issued and not yet settled
    in_flight: BTreeSet<u64>,
    /// Queued callers waiting for every earlier call to settle, by call id
    watchers: BTreeMap<u64, Waker>,
}

impl SemaphoreState {
    fn has_free_slot(&self, limit: usize) -> bool {
        self.running + self.reserved < limit
    }

    /// Hand a freed slot to the oldest queued caller, if any
    fn release_next(&mut self) -> Option<Admission> {
        let (id, admission) = self.blocked.pop_front()?;
        self.reserved += 1;
        debug!(call = id, queued = self.blocked.len(), "releasing queued call");
        Some(admission)
    }
}

impl<F> Semaphore<F> {
    /// Create a semaphore admitting at most `limit` concurrent calls to `worker`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidLimit`] if `limit` is 0.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stdkit_sync::{Semaphore, SyncError};
    ///
    /// let sem = Semaphore::new(4, |x: u32| async move { x }).unwrap();
    /// assert_eq!(sem.limit(), 4);
    ///
    /// let err = Semaphore::new(0, |x: u32| async move { x }).unwrap_err();
    /// assert_eq!(err, SyncError::InvalidLimit { limit: 0 });
    /// ```
    pub fn new(limit: usize, worker: F) -> Result<Self> {
        if limit == 0 {
            return Err(SyncError::InvalidLimit { limit });
        }
        Ok(Self {
            inner: Arc::new(SemaphoreInner {
                limit,
                worker,
                state: Mutex::new(SemaphoreState::default()),
            }),
        })
    }

    /// The configured concurrency limit
    #[must_use]
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Worker invocations executing right now
    ///
    /// Useful for monitoring and tests; the value may change as soon as it is
    /// read.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Callers queued for a slot
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.lock().blocked.len()
    }

    /// Run `worker(value)` once a slot is free and return its output
    ///
    /// If every slot is taken the call queues behind earlier callers and
    /// resumes when a running call finishes. The slot is given back however the
    /// call ends: with a value, with an error, by panicking, or by this future
    /// being dropped.
    pub async fn run<In, Fut>(&self, value: In) -> Fut::Output
    where
        F: Fn(In) -> Fut,
        Fut: Future,
    {
        let inner = &*self.inner;
        let mut call = Call::issue(inner);

        if let Some(admission) = call.admission.take() {
            let in_flight = InFlight {
                inner,
                call: call.id,
            };
            match admission.wait_for_notification(in_flight).await {
                Ok(()) => {}
                Err(never) => match never {},
            }
            call.resume();
        }

        let output = (inner.worker)(value).await;
        drop(call);
        output
    }

    /// Issue one call per input at once and collect every output
    ///
    /// `outputs[i]` belongs to `inputs[i]`; a failing call does not cut the
    /// others short.
    pub async fn run_all<In, Fut, I>(&self, inputs: I) -> Vec<Fut::Output>
    where
        F: Fn(In) -> Fut,
        Fut: Future,
        I: IntoIterator<Item = In>,
    {
        join_all(inputs.into_iter().map(|value| self.run(value))).await
    }
}

impl<F> SemaphoreInner<F> {
    fn lock(&self) -> MutexGuard<'_, SemaphoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F> Clone for Semaphore<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> fmt::Debug for Semaphore<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Semaphore")
            .field("limit", &self.inner.limit)
            .field("running", &state.running)
            .field("reserved", &state.reserved)
            .field("waiting", &state.blocked.len())
            .finish()
    }
}

/// Where a call stands in its admission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting in `blocked`, or released and holding a reserved slot
    Queued,
    /// Holding a running slot
    Running,
}

/// Bookkeeping for one `run` call; settles the call when dropped
struct Call<'a, F> {
    inner: &'a SemaphoreInner<F>,
    id: u64,
    phase: Phase,
    /// Set when the call had to queue
    admission: Option<Admission>,
}

impl<'a, F> Call<'a, F> {
    /// Register a new call and either admit it or queue it
    fn issue(inner: &'a SemaphoreInner<F>) -> Self {
        let mut state = inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.in_flight.insert(id);

        if state.has_free_slot(inner.limit) {
            state.running += 1;
            trace!(call = id, running = state.running, "call admitted");
            return Self {
                inner,
                id,
                phase: Phase::Running,
                admission: None,
            };
        }

        let admission = Admission::new();
        state.blocked.push_back((id, admission.clone()));
        debug!(
            call = id,
            running = state.running,
            reserved = state.reserved,
            queued = state.blocked.len(),
            "no free slot, call queued"
        );
        Self {
            inner,
            id,
            phase: Phase::Queued,
            admission: Some(admission),
        }
    }

    /// Turn the reserved slot handed over on release into a running one
    fn resume(&mut self) {
        let mut state = self.inner.lock();
        state.reserved -= 1;
        state.running += 1;
        // The admission wait is over, so its in-flight watcher is stale
        state.watchers.remove(&self.id);
        self.phase = Phase::Running;
        trace!(call = self.id, running = state.running, "queued call resumed");
    }
}

impl<F> Drop for Call<'_, F> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();

        let released = match self.phase {
            Phase::Running => {
                state.running -= 1;
                state.release_next()
            }
            Phase::Queued => {
                let queued_at = state.blocked.iter().position(|(id, _)| *id == self.id);
                if let Some(pos) = queued_at {
                    // Never released, so it holds nothing
                    state.blocked.remove(pos);
                    None
                } else {
                    // Released but dropped before resuming: pass the slot on
                    state.reserved -= 1;
                    state.release_next()
                }
            }
        };

        state.in_flight.remove(&self.id);
        state.watchers.remove(&self.id);
        let watcher = state
            .in_flight
            .first()
            .copied()
            .and_then(|oldest| state.watchers.remove(&oldest));
        drop(state);

        if let Some(admission) = released {
            let delivered = admission.try_succeed(());
            debug_assert!(delivered, "queued admission notified twice");
        }
        if let Some(waker) = watcher {
            waker.wake();
        }
    }
}

/// Resolves once every call issued before `call` has settled
///
/// This is the notifier obligation of a queued caller: its wake-up comes from
/// one of the calls ahead of it finishing.
struct InFlight<'a, F> {
    inner: &'a SemaphoreInner<F>,
    call: u64,
}

impl<F> Future for InFlight<'_, F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.lock();
        let settled = state
            .in_flight
            .first()
            .map_or(true, |&oldest| oldest >= self.call);
        if settled {
            state.watchers.remove(&self.call);
            return Poll::Ready(());
        }

        state.watchers.insert(self.call, cx.waker().clone());
        Poll::Pending
    }
}
