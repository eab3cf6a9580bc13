//! Rates from cumulative counters.
//!
//! Collectors report absolute, ever-growing counters (bytes sent, CPU time
//! consumed). Two timestamped readings of the same counters give a per-second
//! rate. A counter that goes backwards means its source restarted; the new
//! reading becomes the baseline and that counter reports zero.

use std::time::{Duration, Instant};

/// Timestamped reading of one entity's cumulative counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: Instant,
    pub counters: Vec<u64>,
}

impl Snapshot {
    pub fn new(counters: Vec<u64>) -> Self {
        Self::at(Instant::now(), counters)
    }

    pub fn at(taken_at: Instant, counters: Vec<u64>) -> Self {
        Self { taken_at, counters }
    }
}

/// Per-second rate of each counter between `prev` and `curr`.
///
/// Returns one value per counter in `curr`. Every rate is finite and
/// non-negative: if `curr` is not strictly newer than `prev` all rates are
/// zero, and a counter that decreased (or is missing from `prev`) is zero.
pub fn compute_rate(prev: &Snapshot, curr: &Snapshot) -> Vec<f64> {
    let elapsed = match curr.taken_at.checked_duration_since(prev.taken_at) {
        Some(elapsed) if !elapsed.is_zero() => elapsed.as_secs_f64(),
        _ => return vec![0.0; curr.counters.len()],
    };

    curr.counters
        .iter()
        .enumerate()
        .map(|(i, &now)| match prev.counters.get(i) {
            Some(&before) if now >= before => (now - before) as f64 / elapsed,
            _ => 0.0,
        })
        .collect()
}

/// CPU usage in percent of the whole machine.
///
/// `cpu_time` is the CPU time consumed during `wall_time`. The result is
/// divided by `cores` and clamped to `0.0..=100.0`.
pub fn cpu_percent(cpu_time: Duration, wall_time: Duration, cores: usize) -> f32 {
    if wall_time.is_zero() {
        return 0.0;
    }
    let busy = cpu_time.as_secs_f64() / wall_time.as_secs_f64();
    let percent = busy * 100.0 / cores.max(1) as f64;
    percent.clamp(0.0, 100.0) as f32
}

/// Keeps the previous snapshot of one counter set and turns each new reading
/// into rates.
#[derive(Debug, Clone, Default)]
pub struct DeltaSampler {
    baseline: Option<Snapshot>,
}

impl DeltaSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Rates since the previous reading; zeros on the first one.
    pub fn sample(&mut self, snapshot: Snapshot) -> Vec<f64> {
        let Some(prev) = &self.baseline else {
            let zeros = vec![0.0; snapshot.counters.len()];
            self.baseline = Some(snapshot);
            return zeros;
        };

        // A reading that is not newer cannot produce a rate; keep the older
        // baseline so the next good reading measures against it.
        if snapshot.taken_at <= prev.taken_at {
            return vec![0.0; snapshot.counters.len()];
        }

        let rates = compute_rate(prev, &snapshot);
        self.baseline = Some(snapshot);
        rates
    }

    pub fn sample_now(&mut self, counters: Vec<u64>) -> Vec<f64> {
        self.sample(Snapshot::new(counters))
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}
