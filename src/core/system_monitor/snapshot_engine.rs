use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use super::delta::{compute_rate, cpu_percent, Snapshot};

/// Per-entity delta sampling, keyed by e.g. pid or interface name.
///
/// The first observation of a key only records a baseline. Keys that stop
/// appearing must be dropped with [`retain`](Self::retain), otherwise a
/// recycled key would be measured against a dead entity's counters.
#[derive(Debug, Clone)]
pub struct SnapshotEngine<K> {
    baselines: HashMap<K, Snapshot>,
    cores: usize,
}

impl<K> SnapshotEngine<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(cores: usize) -> Self {
        Self {
            baselines: HashMap::new(),
            cores: cores.max(1),
        }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Record `snapshot` for `key` and return per-second rates since the
    /// previous one (zeros for a new key). A reading that is not newer than
    /// the stored baseline yields zeros and leaves the baseline in place.
    pub fn observe(&mut self, key: K, snapshot: Snapshot) -> Vec<f64> {
        let rates = match self.baselines.get(&key) {
            Some(prev) if snapshot.taken_at <= prev.taken_at => {
                return vec![0.0; snapshot.counters.len()];
            }
            Some(prev) => compute_rate(prev, &snapshot),
            None => vec![0.0; snapshot.counters.len()],
        };
        self.baselines.insert(key, snapshot);
        rates
    }

    /// Record cumulative CPU time (milliseconds) for `key` and return its
    /// CPU usage as a share of the whole machine, `0.0..=100.0`.
    pub fn observe_cpu(&mut self, key: K, taken_at: Instant, cpu_time_ms: u64) -> f32 {
        let snapshot = Snapshot::at(taken_at, vec![cpu_time_ms]);
        let percent = match self.baselines.get(&key) {
            Some(prev) if taken_at <= prev.taken_at => return 0.0,
            Some(prev) => {
                let before = prev.counters.first().copied().unwrap_or(0);
                let wall = taken_at.duration_since(prev.taken_at);
                // Going backwards means a restarted entity: rebase at zero.
                let spent = Duration::from_millis(cpu_time_ms.saturating_sub(before));
                cpu_percent(spent, wall, self.cores)
            }
            None => 0.0,
        };
        self.baselines.insert(key, snapshot);
        percent
    }

    /// Drop every key for which `keep` returns false; returns how many went.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.baselines.len();
        self.baselines.retain(|key, _| keep(key));
        before - self.baselines.len()
    }

    pub fn forget(&mut self, key: &K) -> bool {
        self.baselines.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.baselines.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn clear(&mut self) {
        self.baselines.clear();
    }
}
