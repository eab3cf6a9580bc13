// Integration tests for ring buffers and differential sampling

use std::time::{Duration, Instant};
use sysdash::core::system_monitor::{
    compute_rate, IoRateMonitor, MetricsHistory, NetworkCounters, RingBuffer, Snapshot,
    SnapshotEngine,
};

#[test]
fn test_ring_buffer_keeps_last_n_in_order() {
    for (capacity, appends) in [(1usize, 1usize), (5, 5), (5, 12), (60, 61), (7, 100)] {
        let mut buffer = RingBuffer::new(capacity);
        for value in 0..appends {
            buffer.append(value);
        }
        let expected: Vec<usize> = (appends - capacity..appends).collect();
        assert_eq!(buffer.read(), expected, "capacity {capacity}, appends {appends}");
        assert_eq!(buffer.len(), capacity);
    }
}

#[test]
fn test_rate_is_zero_for_non_advancing_time() {
    let t0 = Instant::now();
    let prev = Snapshot::at(t0 + Duration::from_secs(1), vec![100, 200]);
    for curr_at in [t0, t0 + Duration::from_secs(1)] {
        let curr = Snapshot::at(curr_at, vec![900, 50]);
        let rates = compute_rate(&prev, &curr);
        assert!(rates.iter().all(|r| *r == 0.0), "rates: {rates:?}");
    }
}

#[test]
fn test_half_core_second_on_four_cores() {
    let mut engine = SnapshotEngine::new(4);
    let t0 = Instant::now();
    engine.observe_cpu(1234u32, t0, 60_000);
    let percent = engine.observe_cpu(1234, t0 + Duration::from_secs(1), 60_500);
    assert!((percent - 12.5).abs() < 0.01, "got {percent}");
}

#[test]
fn test_network_restart_never_goes_negative() {
    let monitor = IoRateMonitor::new();
    let t0 = Instant::now();
    let before = NetworkCounters {
        bytes_sent: 1_000_000,
        bytes_recv: 2_000_000,
        packets_sent: 1000,
        packets_recv: 2000,
    };
    monitor.network_rates_at(t0, before);

    // Interface was reset: counters start over.
    let after = NetworkCounters {
        bytes_sent: 500,
        bytes_recv: 700,
        packets_sent: 1,
        packets_recv: 2,
    };
    let rates = monitor.network_rates_at(t0 + Duration::from_secs(1), after);
    assert!(rates.bytes_sent_per_sec >= 0.0);
    assert!(rates.bytes_recv_per_sec >= 0.0);
    assert_eq!(rates.packets_recv_per_sec, 0.0);
}

#[test]
fn test_history_series_are_bounded() {
    let mut history = MetricsHistory::new();
    for i in 0..200 {
        history.push_cpu(i as f32 / 2.0);
        history.push_memory(50.0);
    }
    assert_eq!(history.cpu_usage.len(), history.capacity());
    assert_eq!(history.cpu_usage.latest(), Some(&99.5));
    assert_eq!(history.memory_as_u64().len(), history.capacity());
}
