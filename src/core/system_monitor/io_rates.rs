use std::time::Instant;

use parking_lot::Mutex;

use super::delta::{DeltaSampler, Snapshot};
use super::metrics::{
    CpuStatCounters, CpuStatRates, DiskCounters, DiskRates, NetworkCounters, NetworkRates,
};

#[derive(Debug, Default)]
struct Samplers {
    network: DeltaSampler,
    disk: DeltaSampler,
    cpu_stats: DeltaSampler,
}

/// Turns machine-wide I/O totals into per-second rates.
///
/// Each counter family has its own baseline, so the first call for a family
/// returns zeros. Safe to share between worker threads.
#[derive(Debug, Default)]
pub struct IoRateMonitor {
    samplers: Mutex<Samplers>,
}

impl IoRateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network_rates(&self, counters: NetworkCounters) -> NetworkRates {
        self.network_rates_at(Instant::now(), counters)
    }

    pub fn network_rates_at(&self, taken_at: Instant, counters: NetworkCounters) -> NetworkRates {
        let rates = self.samplers.lock().network.sample(Snapshot::at(
            taken_at,
            vec![
                counters.bytes_sent,
                counters.bytes_recv,
                counters.packets_sent,
                counters.packets_recv,
            ],
        ));
        NetworkRates {
            bytes_sent_per_sec: rates[0],
            bytes_recv_per_sec: rates[1],
            packets_sent_per_sec: rates[2],
            packets_recv_per_sec: rates[3],
        }
    }

    pub fn disk_rates(&self, counters: DiskCounters) -> DiskRates {
        self.disk_rates_at(Instant::now(), counters)
    }

    pub fn disk_rates_at(&self, taken_at: Instant, counters: DiskCounters) -> DiskRates {
        let rates = self.samplers.lock().disk.sample(Snapshot::at(
            taken_at,
            vec![
                counters.read_bytes,
                counters.write_bytes,
                counters.read_count,
                counters.write_count,
            ],
        ));
        DiskRates {
            read_bytes_per_sec: rates[0],
            write_bytes_per_sec: rates[1],
            read_count_per_sec: rates[2],
            write_count_per_sec: rates[3],
        }
    }

    pub fn cpu_stat_rates(&self, counters: CpuStatCounters) -> CpuStatRates {
        self.cpu_stat_rates_at(Instant::now(), counters)
    }

    pub fn cpu_stat_rates_at(&self, taken_at: Instant, counters: CpuStatCounters) -> CpuStatRates {
        let rates = self.samplers.lock().cpu_stats.sample(Snapshot::at(
            taken_at,
            vec![counters.context_switches, counters.interrupts],
        ));
        CpuStatRates {
            context_switches_per_sec: rates[0],
            interrupts_per_sec: rates[1],
        }
    }

    /// Forget every baseline.
    pub fn reset(&self) {
        *self.samplers.lock() = Samplers::default();
    }
}
