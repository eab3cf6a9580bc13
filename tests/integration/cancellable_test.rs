// Integration tests for cooperative cancellation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sysdash::core::tasks::{dispatch, TaskEvent, WorkerPool, CANCEL_POLL_GRANULARITY};

#[test]
fn test_cancel_stops_loop_early_without_result() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let iterations = Arc::new(AtomicUsize::new(0));
    let got_result = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let counter = Arc::clone(&iterations);
    let result_flag = Arc::clone(&got_result);
    let finished_flag = Arc::clone(&finished);
    let handle = pool.submit_cancellable(
        move |ctx| {
            for _ in 0..100 {
                ctx.check_cancelled()?;
                thread::sleep(Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(counter.load(Ordering::SeqCst))
        },
        move |event| match event {
            TaskEvent::Result(_) => result_flag.store(true, Ordering::SeqCst),
            TaskEvent::Finished => finished_flag.store(true, Ordering::SeqCst),
            _ => {}
        },
    );

    while iterations.load(Ordering::SeqCst) < 5 {
        thread::sleep(Duration::from_millis(2));
    }
    handle.cancel();

    assert!(event_loop.run_until(Duration::from_secs(2), || finished.load(Ordering::SeqCst)));
    assert!(iterations.load(Ordering::SeqCst) < 20);
    assert!(!got_result.load(Ordering::SeqCst));
    assert!(handle.is_completed());
}

#[test]
fn test_cancellation_observed_within_poll_granularity() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let finished = Arc::new(AtomicBool::new(false));
    let started = Arc::new(AtomicBool::new(false));

    let started_flag = Arc::clone(&started);
    let finished_flag = Arc::clone(&finished);
    let handle = pool.submit_cancellable(
        move |ctx| -> anyhow::Result<()> {
            started_flag.store(true, Ordering::SeqCst);
            loop {
                ctx.check_cancelled()?;
                thread::sleep(CANCEL_POLL_GRANULARITY / 5);
            }
        },
        move |event: TaskEvent<()>| {
            if event.is_finished() {
                finished_flag.store(true, Ordering::SeqCst);
            }
        },
    );

    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }
    handle.cancel();

    assert!(event_loop.run_until(CANCEL_POLL_GRANULARITY * 10, || {
        finished.load(Ordering::SeqCst)
    }));
}

#[test]
fn test_error_after_cancel_is_suppressed() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let errors = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));

    let errors_count = Arc::clone(&errors);
    let finished_flag = Arc::clone(&finished);
    let release_flag = Arc::clone(&release);
    let handle = pool.submit_cancellable(
        move |_ctx| -> anyhow::Result<()> {
            while !release_flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
            anyhow::bail!("query failed after cancel")
        },
        move |event| match event {
            TaskEvent::Error(_) => {
                errors_count.fetch_add(1, Ordering::SeqCst);
            }
            TaskEvent::Finished => finished_flag.store(true, Ordering::SeqCst),
            _ => {}
        },
    );

    handle.cancel();
    release.store(true, Ordering::SeqCst);

    assert!(event_loop.run_until(Duration::from_secs(2), || finished.load(Ordering::SeqCst)));
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}
