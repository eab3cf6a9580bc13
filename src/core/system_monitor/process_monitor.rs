//! Process table with a cheap CPU-only refresh path.
//!
//! A full refresh (slow, e.g. every few seconds) reads the whole process table
//! and caches name, memory and status. A fast update (e.g. every 500 ms) only
//! takes CPU time readings and reuses the cached details. Both paths share one
//! [`SnapshotEngine`], so they can run from different periodic tasks.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use parking_lot::Mutex;

use super::metrics::{CpuSample, ProcessInfo, ProcessSample};
use super::snapshot_engine::SnapshotEngine;

#[derive(Debug, Clone)]
struct CachedDetails {
    name: String,
    memory_bytes: u64,
    status: String,
}

#[derive(Debug)]
struct MonitorState {
    engine: SnapshotEngine<u32>,
    details: HashMap<u32, CachedDetails>,
    initialized: bool,
}

/// Thread-safe per-process CPU tracker.
#[derive(Debug)]
pub struct ProcessMonitor {
    state: Mutex<MonitorState>,
}

impl ProcessMonitor {
    pub fn new(cores: usize) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                engine: SnapshotEngine::new(cores),
                details: HashMap::new(),
                initialized: false,
            }),
        }
    }

    /// Whether a full refresh has completed at least once.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn tracked(&self) -> usize {
        self.state.lock().details.len()
    }

    pub fn full_refresh(&self, samples: Vec<ProcessSample>) -> Vec<ProcessInfo> {
        self.full_refresh_at(Instant::now(), samples)
    }

    /// Replace the cached table with `samples` taken at `taken_at`.
    ///
    /// Processes seen for the first time report 0% CPU. Pids missing from
    /// `samples` are forgotten.
    pub fn full_refresh_at(&self, taken_at: Instant, samples: Vec<ProcessSample>) -> Vec<ProcessInfo> {
        let mut state = self.state.lock();
        let alive: HashSet<u32> = samples.iter().map(|s| s.pid).collect();

        let mut processes = Vec::with_capacity(samples.len());
        for sample in samples {
            let cpu_percent = state
                .engine
                .observe_cpu(sample.pid, taken_at, sample.cpu_time_ms);

            processes.push(ProcessInfo {
                pid: sample.pid,
                name: sample.name.clone(),
                cpu_percent,
                memory_bytes: sample.memory_bytes,
                status: sample.status.clone(),
            });
            state.details.insert(
                sample.pid,
                CachedDetails {
                    name: sample.name,
                    memory_bytes: sample.memory_bytes,
                    status: sample.status,
                },
            );
        }

        let pruned = state.engine.retain(|pid| alive.contains(pid));
        state.details.retain(|pid, _| alive.contains(pid));
        state.initialized = true;

        if pruned > 0 {
            log::trace!("Process monitor pruned {} exited processes", pruned);
        }

        sort_by_cpu(&mut processes);
        processes
    }

    pub fn fast_update(&self, samples: Vec<CpuSample>) -> Vec<ProcessInfo> {
        self.fast_update_at(Instant::now(), samples)
    }

    /// Recompute CPU usage for already known processes.
    ///
    /// Returns nothing before the first full refresh. Unknown pids wait for
    /// the next full refresh; known pids absent from `samples` have exited and
    /// are dropped.
    pub fn fast_update_at(&self, taken_at: Instant, samples: Vec<CpuSample>) -> Vec<ProcessInfo> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Vec::new();
        }

        let mut seen = HashSet::with_capacity(samples.len());
        let mut processes = Vec::with_capacity(samples.len());
        for sample in samples {
            let Some(details) = state.details.get(&sample.pid).cloned() else {
                continue;
            };
            seen.insert(sample.pid);
            let cpu_percent = state
                .engine
                .observe_cpu(sample.pid, taken_at, sample.cpu_time_ms);
            processes.push(ProcessInfo {
                pid: sample.pid,
                name: details.name,
                cpu_percent,
                memory_bytes: details.memory_bytes,
                status: details.status,
            });
        }

        state.engine.retain(|pid| seen.contains(pid));
        state.details.retain(|pid, _| seen.contains(pid));

        sort_by_cpu(&mut processes);
        processes
    }
}

fn sort_by_cpu(processes: &mut [ProcessInfo]) {
    processes.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
}
