// Integration tests for Cache<T>: single-flight loads, fallback and stale data

use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sysdash::core::cache::{Cache, CacheEvent, CacheState};
use sysdash::core::tasks::{dispatch, EventLoop, WorkerPool};

const WAIT: Duration = Duration::from_secs(5);

fn pool() -> (WorkerPool, EventLoop) {
    let (dispatcher, event_loop) = dispatch::channel();
    (WorkerPool::new(dispatcher).unwrap(), event_loop)
}

#[test]
fn test_concurrent_load_calls_start_one_task() {
    let (pool, event_loop) = pool();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let cache = Cache::new(pool, move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        Ok("drives".to_string())
    });

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || {
                cache.load();
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    assert!(event_loop.run_until(WAIT, || cache.is_loaded()));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Only one loader should run");
}

#[test]
fn test_get_never_waits_for_a_running_load() {
    let (pool, event_loop) = pool();
    let cache = Cache::builder(pool, || {
        thread::sleep(Duration::from_millis(300));
        Ok(vec!["svc".to_string()])
    })
    .fallback(Vec::new())
    .build();

    cache.load();
    let start = Instant::now();
    for _ in 0..1000 {
        assert_eq!(cache.get(true), Some(Vec::new()));
    }
    assert!(start.elapsed() < Duration::from_millis(200));

    assert!(event_loop.run_until(WAIT, || cache.is_loaded()));
    assert_eq!(cache.get(true), Some(vec!["svc".to_string()]));
}

#[test]
fn test_delayed_success_emits_data_loaded_once() {
    let (pool, event_loop) = pool();
    let cache = Cache::new(pool, || {
        thread::sleep(Duration::from_millis(50));
        Ok(42)
    });

    let states = Arc::new(Mutex::new(vec![cache.state()]));
    let loaded = Arc::new(AtomicUsize::new(0));
    let states_sink = Arc::clone(&states);
    let loaded_count = Arc::clone(&loaded);
    cache.subscribe(move |event| match event {
        CacheEvent::StateChanged(state) => states_sink.lock().push(*state),
        CacheEvent::DataLoaded(_) => {
            loaded_count.fetch_add(1, Ordering::SeqCst);
        }
        CacheEvent::ErrorOccurred(_) => {}
    });

    cache.load();
    assert!(event_loop.run_until(WAIT, || cache.is_loaded()));
    event_loop.run_for(Duration::from_millis(50));

    assert_eq!(
        *states.lock(),
        vec![CacheState::Idle, CacheState::Loading, CacheState::Loaded]
    );
    assert_eq!(cache.get(false), Some(42));
    assert_eq!(loaded.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failure_reports_message_and_serves_fallback() {
    let (pool, event_loop) = pool();
    let cache: Cache<Vec<String>> = Cache::builder(pool, || Err(anyhow!("boom")))
        .fallback(Vec::new())
        .build();

    cache.load();
    assert!(event_loop.run_until(WAIT, || cache.has_error()));

    assert_eq!(cache.state(), CacheState::Error);
    assert_eq!(cache.get_error(), Some("boom".to_string()));
    assert_eq!(cache.get(true), Some(Vec::new()));
}

#[test]
fn test_failed_refresh_keeps_previous_value() {
    let (pool, event_loop) = pool();
    let offline = Arc::new(AtomicBool::new(false));
    let offline_clone = Arc::clone(&offline);
    let cache = Cache::new(pool, move || {
        if offline_clone.load(Ordering::SeqCst) {
            Err(anyhow!("WMI unavailable"))
        } else {
            Ok(vec![1, 2, 3])
        }
    });

    cache.load();
    assert!(event_loop.run_until(WAIT, || cache.is_loaded()));

    offline.store(true, Ordering::SeqCst);
    cache.refresh();
    assert!(event_loop.run_until(WAIT, || cache.has_error()));

    assert_eq!(cache.get(false), Some(vec![1, 2, 3]));
    assert_eq!(cache.get_error(), Some("WMI unavailable".to_string()));
}

#[test]
fn test_panicking_loader_puts_cache_in_error() {
    let (pool, event_loop) = pool();
    let cache = Cache::new(pool, || -> anyhow::Result<u32> { panic!("driver query crashed") });

    cache.load();
    assert!(event_loop.run_until(WAIT, || cache.has_error()));
    assert!(cache.get_error().unwrap().contains("driver query crashed"));

    // The cache can be retried after a panic.
    assert!(cache.refresh());
}
