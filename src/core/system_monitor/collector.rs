use parking_lot::Mutex;
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};

use crate::error::{Result, SysdashError};

use super::metrics::*;

/// Raw counters from the operating system via `sysinfo`.
///
/// Every method takes `&self` and locks internally, so one collector can be
/// shared (in an `Arc`) by several periodic tasks.
pub struct SystemCollector {
    system: Mutex<System>,
    networks: Mutex<Networks>,
    cores: usize,
}

impl SystemCollector {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_processes(
                ProcessRefreshKind::nothing()
                    .with_cpu()
                    .with_memory()
                    .with_disk_usage(),
            );

        let system = System::new_with_specifics(refresh_kind);
        let cores = system.cpus().len().max(1);

        Self {
            system: Mutex::new(system),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            cores,
        }
    }

    /// Logical CPU count.
    pub fn core_count(&self) -> usize {
        self.cores
    }

    /// Full process table with cumulative CPU time.
    pub fn process_samples(&self) -> Result<Vec<ProcessSample>> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        let samples: Vec<_> = system
            .processes()
            .values()
            .map(|proc| ProcessSample {
                pid: proc.pid().as_u32(),
                name: proc.name().to_string_lossy().to_string(),
                cpu_time_ms: proc.accumulated_cpu_time(),
                memory_bytes: proc.memory(),
                status: format!("{:?}", proc.status()),
            })
            .collect();

        if samples.is_empty() {
            return Err(SysdashError::collector("process table is empty"));
        }
        Ok(samples)
    }

    /// CPU time readings only; much cheaper than [`process_samples`](Self::process_samples).
    pub fn cpu_samples(&self) -> Result<Vec<CpuSample>> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );

        let samples: Vec<_> = system
            .processes()
            .values()
            .map(|proc| CpuSample {
                pid: proc.pid().as_u32(),
                cpu_time_ms: proc.accumulated_cpu_time(),
            })
            .collect();

        if samples.is_empty() {
            return Err(SysdashError::collector("process table is empty"));
        }
        Ok(samples)
    }

    /// Totals across all interfaces.
    pub fn network_counters(&self) -> NetworkCounters {
        let mut networks = self.networks.lock();
        networks.refresh(true);

        networks
            .values()
            .fold(NetworkCounters::default(), |mut acc, data| {
                acc.bytes_sent += data.total_transmitted();
                acc.bytes_recv += data.total_received();
                acc.packets_sent += data.total_packets_transmitted();
                acc.packets_recv += data.total_packets_received();
                acc
            })
    }

    /// Bytes read and written by all processes.
    ///
    /// `sysinfo` has no operation counts, so `read_count`/`write_count` stay 0.
    pub fn disk_counters(&self) -> DiskCounters {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );

        system
            .processes()
            .values()
            .fold(DiskCounters::default(), |mut acc, proc| {
                let usage = proc.disk_usage();
                acc.read_bytes += usage.total_read_bytes;
                acc.write_bytes += usage.total_written_bytes;
                acc
            })
    }

    /// Context switch and interrupt totals, where the platform exposes them.
    pub fn cpu_stat_counters(&self) -> Option<CpuStatCounters> {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/stat") {
                Ok(content) => parse_proc_stat(&content),
                Err(err) => {
                    log::debug!("Cannot read /proc/stat: {}", err);
                    None
                }
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    pub fn snapshot(&self) -> Result<SystemSnapshot> {
        let (cpu, memory, process_count) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing(),
            );
            (
                collect_cpu(&system),
                collect_memory(&system),
                system.processes().len(),
            )
        };

        Ok(SystemSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            cpu,
            memory,
            network: self.network_counters(),
            process_count,
        })
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemCollector")
            .field("cores", &self.cores)
            .finish()
    }
}

fn collect_cpu(system: &System) -> CpuMetrics {
    let cpus = system.cpus();

    CpuMetrics {
        global_usage: system.global_cpu_usage(),
        per_core_usage: cpus.iter().map(|cpu| cpu.cpu_usage()).collect(),
        core_count: cpus.len(),
        brand: cpus
            .first()
            .map(|c| c.brand().to_string())
            .unwrap_or_default(),
    }
}

fn collect_memory(system: &System) -> MemoryMetrics {
    let total = system.total_memory();
    let used = system.used_memory();
    let swap_total = system.total_swap();
    let swap_used = system.used_swap();

    MemoryMetrics {
        total_bytes: total,
        used_bytes: used,
        available_bytes: system.available_memory(),
        usage_percent: percent_of(used, total),
        swap_total_bytes: swap_total,
        swap_used_bytes: swap_used,
        swap_percent: percent_of(swap_used, swap_total),
    }
}

fn percent_of(part: u64, total: u64) -> f32 {
    if total > 0 {
        (part as f32 / total as f32) * 100.0
    } else {
        0.0
    }
}

/// Extract `ctxt` and the `intr` total from `/proc/stat` content.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_stat(content: &str) -> Option<CpuStatCounters> {
    let mut context_switches = None;
    let mut interrupts = None;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("ctxt") => context_switches = fields.next().and_then(|v| v.parse().ok()),
            Some("intr") => interrupts = fields.next().and_then(|v| v.parse().ok()),
            _ => {}
        }
    }

    Some(CpuStatCounters {
        context_switches: context_switches?,
        interrupts: interrupts?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_stat() {
        let content = "cpu  10 20 30 40\ncpu0 5 10 15 20\nintr 123456 0 9 0\nctxt 987654\nbtime 1700000000\n";
        assert_eq!(
            parse_proc_stat(content),
            Some(CpuStatCounters {
                context_switches: 987_654,
                interrupts: 123_456,
            })
        );
    }

    #[test]
    fn test_parse_proc_stat_missing_fields() {
        assert_eq!(parse_proc_stat("cpu 1 2 3\nctxt 10\n"), None);
        assert_eq!(parse_proc_stat(""), None);
    }

    #[test]
    fn test_percent_of_zero_total() {
        assert_eq!(percent_of(10, 0), 0.0);
        assert_eq!(percent_of(50, 200), 25.0);
    }

    #[test]
    fn test_collector_reports_processes() {
        let collector = SystemCollector::new();
        assert!(collector.core_count() >= 1);

        let samples = collector.process_samples().unwrap();
        let own_pid = std::process::id();
        assert!(samples.iter().any(|s| s.pid == own_pid));

        let snapshot = collector.snapshot().unwrap();
        assert!(snapshot.process_count > 0);
        assert!(snapshot.memory.total_bytes > 0);
    }
}
