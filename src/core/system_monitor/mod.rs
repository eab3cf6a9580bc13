//! System monitoring core functionality.
//!
//! Collectors yield raw cumulative counters; the delta layer turns them into
//! rates and the history keeps short series for sparklines.

mod collector;
pub mod delta;
mod history;
mod io_rates;
mod metrics;
mod process_monitor;
mod ring_buffer;
mod snapshot_engine;

pub use collector::SystemCollector;
pub use delta::{compute_rate, cpu_percent, DeltaSampler, Snapshot};
pub use history::{MetricsHistory, DEFAULT_HISTORY_SIZE};
pub use io_rates::IoRateMonitor;
pub use metrics::{
    CpuMetrics, CpuSample, CpuStatCounters, CpuStatRates, DiskCounters, DiskRates, MemoryMetrics,
    NetworkCounters, NetworkRates, ProcessInfo, ProcessSample, SystemSnapshot,
};
pub use process_monitor::ProcessMonitor;
pub use ring_buffer::RingBuffer;
pub use snapshot_engine::SnapshotEngine;
