//! Live monitoring: a fast CPU-only poll and a slower full refresh share one
//! collector and process monitor, and print JSON lines.

use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::system_monitor::{
    CpuStatRates, DiskRates, IoRateMonitor, MetricsHistory, NetworkRates, ProcessInfo,
    ProcessMonitor, SystemCollector, SystemSnapshot,
};
use crate::core::tasks::TaskEvent;
use crate::core::Config;

/// Everything the full refresh produces in one iteration.
#[derive(Debug, Clone, Serialize)]
struct FullReport {
    system: SystemSnapshot,
    network: NetworkRates,
    disk: DiskRates,
    cpu_stats: Option<CpuStatRates>,
    top_processes: Vec<ProcessInfo>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WatchLine<'a> {
    Fast {
        at: String,
        top_processes: &'a [ProcessInfo],
    },
    Full {
        at: String,
        #[serde(flatten)]
        report: &'a FullReport,
        cpu_history: Vec<u64>,
    },
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

fn print_line(line: &WatchLine<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(err) => log::warn!("Failed to render watch output: {}", err),
    }
}

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(&ms) = matches.get_one::<u64>("fast-ms") {
        config.fast_refresh_ms = ms;
    }
    if let Some(&ms) = matches.get_one::<u64>("full-ms") {
        config.full_refresh_ms = ms;
    }
    let top = matches.get_one::<usize>("top").copied().unwrap_or(10);
    let max_reports = matches.get_one::<u64>("count").copied();

    let (pool, event_loop) = super::start_pool(&config)?;
    let stop = super::interrupt_flag("Stopping monitor...")?;

    let collector = Arc::new(SystemCollector::new());
    let monitor = Arc::new(ProcessMonitor::new(collector.core_count()));
    let io_rates = Arc::new(IoRateMonitor::new());
    let history = Arc::new(Mutex::new(MetricsHistory::with_capacity(config.history_capacity)));
    let reports = Arc::new(AtomicU64::new(0));

    eprintln!(
        "{} (fast {:?}, full {:?}). Press Ctrl+C to stop.",
        "Watching system".cyan().bold(),
        config.fast_refresh(),
        config.full_refresh()
    );

    let mut full = {
        let collector = Arc::clone(&collector);
        let monitor = Arc::clone(&monitor);
        let io_rates = Arc::clone(&io_rates);
        let history = Arc::clone(&history);
        let reports = Arc::clone(&reports);

        pool.start_periodic(
            config.full_refresh(),
            move || {
                let mut processes = monitor.full_refresh(collector.process_samples()?);
                processes.truncate(top);
                let system = collector.snapshot()?;
                Ok(FullReport {
                    network: io_rates.network_rates(system.network),
                    disk: io_rates.disk_rates(collector.disk_counters()),
                    cpu_stats: collector
                        .cpu_stat_counters()
                        .map(|counters| io_rates.cpu_stat_rates(counters)),
                    system,
                    top_processes: processes,
                })
            },
            move |event| match event {
                TaskEvent::Result(report) => {
                    let cpu_history = {
                        let mut history = history.lock();
                        history.record(&report.system, &report.network);
                        history.cpu_as_u64()
                    };
                    print_line(&WatchLine::Full {
                        at: now(),
                        report: &report,
                        cpu_history,
                    });
                    reports.fetch_add(1, Ordering::Relaxed);
                }
                TaskEvent::Error(message) => {
                    eprintln!("{} {}", "Full refresh failed:".red(), message);
                }
                TaskEvent::Progress(_) | TaskEvent::Finished => {}
            },
        )
    };

    let mut fast = {
        let collector = Arc::clone(&collector);
        let monitor = Arc::clone(&monitor);

        pool.start_periodic(
            config.fast_refresh(),
            move || {
                let mut processes = monitor.fast_update(collector.cpu_samples()?);
                processes.truncate(top);
                Ok(processes)
            },
            move |event| match event {
                // Empty until the first full refresh has run.
                TaskEvent::Result(processes) if !processes.is_empty() => {
                    print_line(&WatchLine::Fast {
                        at: now(),
                        top_processes: &processes,
                    });
                }
                TaskEvent::Error(message) => {
                    log::debug!("Fast update failed: {}", message);
                }
                _ => {}
            },
        )
    };

    loop {
        event_loop.run_for(Duration::from_millis(100));
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if max_reports.is_some_and(|max| reports.load(Ordering::Relaxed) >= max) {
            break;
        }
    }

    let fast_stopped = fast.stop();
    let full_stopped = full.stop();
    event_loop.process_events();

    if let Err(err) = fast_stopped.and(full_stopped) {
        eprintln!("{} {}", "Warning:".yellow(), err);
    }
    eprintln!(
        "{} after {} full reports",
        "Monitor stopped".green(),
        reports.load(Ordering::Relaxed)
    );
    Ok(())
}
