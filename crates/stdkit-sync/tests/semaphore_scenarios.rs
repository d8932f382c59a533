//! End-to-end throttling scenarios for `Semaphore`
//!
//! Workers here really suspend (timers or explicit yields), so queued callers
//! are exercised through the compio runtime rather than stepped by hand.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use futures::FutureExt;
use rstest::rstest;
use stdkit_sync::{Semaphore, SyncError};

/// Tracks how many workers are active and the highest count ever seen
#[derive(Clone, Default)]
struct ConcurrencyProbe {
    active: Rc<Cell<usize>>,
    peak: Rc<Cell<usize>>,
}

struct ActiveGuard(Rc<Cell<usize>>);

impl ConcurrencyProbe {
    fn enter(&self) -> ActiveGuard {
        let now = self.active.get() + 1;
        self.active.set(now);
        self.peak.set(self.peak.get().max(now));
        ActiveGuard(Rc::clone(&self.active))
    }

    fn peak(&self) -> usize {
        self.peak.get()
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Suspends exactly once, rescheduling itself immediately
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

fn yield_now() -> YieldNow {
    YieldNow(false)
}

#[compio::test]
async fn test_two_slots_five_calls_run_in_three_batches() {
    let delay = Duration::from_millis(20);
    let sem = Semaphore::new(2, move |x: u32| async move {
        compio::time::sleep(delay).await;
        x
    })
    .unwrap();

    let start = Instant::now();
    let results = sem.run_all(vec![10, 20, 30, 40, 50]).await;
    let elapsed = start.elapsed();

    assert_eq!(results, vec![10, 20, 30, 40, 50]);
    assert!(
        elapsed >= delay * 3,
        "expected at least three batches, took {elapsed:?}"
    );
}

#[compio::test]
async fn test_single_slot_ten_thousand_calls() {
    let probe = ConcurrencyProbe::default();
    let worker_probe = probe.clone();
    let sem = Semaphore::new(1, move |x: usize| {
        let probe = worker_probe.clone();
        async move {
            let _active = probe.enter();
            yield_now().await;
            x * 3
        }
    })
    .unwrap();

    let results = sem.run_all(0..10_000).await;

    assert_eq!(results.len(), 10_000);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(*result, i * 3);
    }
    assert_eq!(probe.peak(), 1);
    assert_eq!(sem.running(), 0);
    assert_eq!(sem.waiting(), 0);
}

#[compio::test]
async fn test_worker_failure_only_rejects_its_own_call() {
    let sem = Semaphore::new(10, |x: u32| async move {
        compio::time::sleep(Duration::from_millis(5)).await;
        if x == 3 {
            Err(anyhow!("job {x} failed"))
        } else {
            Ok(x)
        }
    })
    .unwrap();

    let results = sem.run_all(0..10).await;

    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => assert_eq!(value as usize, i),
            Err(e) => {
                assert_eq!(i, 3);
                assert_eq!(e.to_string(), "job 3 failed");
            }
        }
    }
    assert_eq!(sem.running(), 0);
}

#[compio::test]
async fn test_worker_failure_does_not_starve_queue() {
    let sem = Semaphore::new(1, |x: u32| async move {
        yield_now().await;
        if x % 2 == 0 {
            Err(format!("even input {x}"))
        } else {
            Ok(x)
        }
    })
    .unwrap();

    let results = sem.run_all(0..6).await;

    assert_eq!(
        results,
        vec![
            Err("even input 0".to_string()),
            Ok(1),
            Err("even input 2".to_string()),
            Ok(3),
            Err("even input 4".to_string()),
            Ok(5),
        ]
    );
    assert_eq!(sem.waiting(), 0);
}

#[compio::test]
async fn test_queued_callers_start_in_arrival_order() {
    let started = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&started);
    let sem = Semaphore::new(1, move |x: u32| {
        let log = Rc::clone(&log);
        async move {
            log.borrow_mut().push(x);
            compio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .unwrap();

    sem.run_all(0..20).await;

    assert_eq!(*started.borrow(), (0..20).collect::<Vec<_>>());
}

#[compio::test]
async fn test_panicking_worker_releases_its_slot() {
    let sem = Semaphore::new(1, |x: u32| async move {
        yield_now().await;
        assert!(x != 0, "worker rejected input 0");
        x
    })
    .unwrap();

    let outcome = AssertUnwindSafe(sem.run(0)).catch_unwind().await;
    assert!(outcome.is_err());
    assert_eq!(sem.running(), 0);

    assert_eq!(sem.run(7).await, 7);
}

#[compio::test]
async fn test_spawned_callers_share_one_semaphore() {
    let probe = ConcurrencyProbe::default();
    let worker_probe = probe.clone();
    let sem = Semaphore::new(4, move |i: usize| {
        let probe = worker_probe.clone();
        async move {
            let _active = probe.enter();
            compio::time::sleep(Duration::from_millis(2)).await;
            i
        }
    })
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let sem = sem.clone();
        handles.push(compio::runtime::spawn(async move { sem.run(i).await }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results, (0..32).collect::<Vec<_>>());
    assert!(probe.peak() <= 4);
    assert_eq!(sem.running(), 0);
}

#[rstest]
#[case(1, 8)]
#[case(2, 8)]
#[case(3, 20)]
#[case(8, 8)]
#[case(16, 4)]
fn test_never_exceeds_limit(#[case] limit: usize, #[case] calls: usize) {
    let runtime = compio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let probe = ConcurrencyProbe::default();
        let worker_probe = probe.clone();
        let sem = Semaphore::new(limit, move |i: usize| {
            let probe = worker_probe.clone();
            async move {
                let _active = probe.enter();
                compio::time::sleep(Duration::from_millis(2)).await;
                i
            }
        })
        .unwrap();

        let results = sem.run_all(0..calls).await;

        assert_eq!(results, (0..calls).collect::<Vec<_>>());
        assert_eq!(probe.peak(), limit.min(calls));
    });
}

#[test]
fn test_zero_limit_is_a_construction_error() {
    let result = Semaphore::new(0, |x: u32| async move { x });
    assert!(matches!(result, Err(SyncError::InvalidLimit { limit: 0 })));
}
