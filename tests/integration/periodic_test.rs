// Integration tests for periodic tasks: shutdown and shared collectors

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysdash::core::system_monitor::{CpuSample, ProcessInfo, ProcessMonitor, ProcessSample};
use sysdash::core::tasks::{dispatch, TaskEvent, WorkerPool};

#[test]
fn test_immediate_stop_emits_single_finished_and_no_results() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&events);
    let mut handle = pool.start_periodic(
        Duration::from_millis(10),
        || Ok(1u32),
        move |event| sink.lock().push(event),
    );
    handle.stop().unwrap();

    event_loop.run_for(Duration::from_millis(200));

    let events = events.lock();
    let finished = events.iter().filter(|e| e.is_finished()).count();
    assert_eq!(finished, 1, "events: {:?}", *events);
    assert!(!events.iter().any(|e| matches!(e, TaskEvent::Result(_))));
}

#[test]
fn test_no_results_delivered_after_stop_returns() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let results = Arc::new(AtomicUsize::new(0));

    let results_clone = Arc::clone(&results);
    let mut handle = pool.start_periodic(
        Duration::from_millis(5),
        || Ok(()),
        move |event| {
            if let TaskEvent::Result(()) = event {
                results_clone.fetch_add(1, Ordering::SeqCst);
            }
        },
    );

    assert!(event_loop.run_until(Duration::from_secs(2), || {
        results.load(Ordering::SeqCst) >= 3
    }));
    handle.stop().unwrap();
    let at_stop = results.load(Ordering::SeqCst);

    event_loop.run_for(Duration::from_millis(100));
    assert_eq!(results.load(Ordering::SeqCst), at_stop);
}

/// Synthetic process table whose CPU counters advance on every read.
struct FakeProcessSource {
    ticks: AtomicU64,
}

impl FakeProcessSource {
    fn full(&self) -> Vec<ProcessSample> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        (1..=5)
            .map(|pid| ProcessSample {
                pid,
                name: format!("worker-{pid}"),
                cpu_time_ms: tick * 10 * pid as u64,
                memory_bytes: 4096,
                status: "Run".to_string(),
            })
            .collect()
    }

    fn fast(&self) -> Vec<CpuSample> {
        self.full().iter().map(CpuSample::from).collect()
    }
}

#[test]
fn test_fast_and_full_polls_share_one_monitor() {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let source = Arc::new(FakeProcessSource {
        ticks: AtomicU64::new(1),
    });
    let monitor = Arc::new(ProcessMonitor::new(4));
    let fast_results: Arc<Mutex<Vec<Vec<ProcessInfo>>>> = Arc::new(Mutex::new(Vec::new()));
    let full_runs = Arc::new(AtomicUsize::new(0));

    let mut full = {
        let source = Arc::clone(&source);
        let monitor = Arc::clone(&monitor);
        let full_runs = Arc::clone(&full_runs);
        pool.start_periodic(
            Duration::from_millis(60),
            move || Ok(monitor.full_refresh(source.full())),
            move |event| {
                if let TaskEvent::Result(_) = event {
                    full_runs.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
    };
    let mut fast = {
        let source = Arc::clone(&source);
        let monitor = Arc::clone(&monitor);
        let fast_results = Arc::clone(&fast_results);
        pool.start_periodic(
            Duration::from_millis(15),
            move || Ok(monitor.fast_update(source.fast())),
            move |event| {
                if let TaskEvent::Result(processes) = event {
                    if !processes.is_empty() {
                        fast_results.lock().push(processes);
                    }
                }
            },
        )
    };

    assert!(event_loop.run_until(Duration::from_secs(3), || {
        full_runs.load(Ordering::SeqCst) >= 2 && fast_results.lock().len() >= 3
    }));
    fast.stop().unwrap();
    full.stop().unwrap();

    for batch in fast_results.lock().iter() {
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|p| p.name.starts_with("worker-")));
        assert!(batch.iter().all(|p| (0.0..=100.0).contains(&p.cpu_percent)));
    }
    assert_eq!(monitor.tracked(), 5);
}
