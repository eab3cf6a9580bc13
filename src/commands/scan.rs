use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use humansize::{format_size, BINARY};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::storage::{ensure_accessible, scan_directory, DirEntry, ScanBatch};
use crate::core::tasks::{EventLoop, TaskEvent, WorkerPool};
use crate::core::Config;

const TICK: Duration = Duration::from_millis(50);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(20);
    let batch = matches.get_flag("batch");

    if !path.is_dir() {
        bail!("Not a directory: {}", path.display());
    }

    let config = Config::load()?;
    let (pool, event_loop) = super::start_pool(&config)?;
    let interrupted = super::interrupt_flag("Cancelling scan...")?;

    if batch {
        scan_batch(&pool, &event_loop, &path, &interrupted, limit)
    } else {
        scan_single(&pool, &event_loop, &path, &interrupted, limit)
    }
}

fn scan_single(
    pool: &WorkerPool,
    event_loop: &EventLoop,
    path: &Path,
    interrupted: &AtomicBool,
    limit: usize,
) -> Result<()> {
    let result: Arc<Mutex<Option<Result<Vec<DirEntry>, String>>>> = Arc::new(Mutex::new(None));
    let finished = Arc::new(AtomicBool::new(false));

    let scan_path = path.to_path_buf();
    let result_slot = Arc::clone(&result);
    let finished_flag = Arc::clone(&finished);
    let handle = pool.submit_cancellable(
        move |ctx| Ok(scan_directory(&scan_path, ctx)?),
        move |event| match event {
            TaskEvent::Progress(percent) => eprint!("\rScanning... {percent:>3}%"),
            TaskEvent::Result(entries) => *result_slot.lock() = Some(Ok(entries)),
            TaskEvent::Error(message) => *result_slot.lock() = Some(Err(message)),
            TaskEvent::Finished => finished_flag.store(true, Ordering::Release),
        },
    );

    while !finished.load(Ordering::Acquire) {
        event_loop.run_for(TICK);
        if interrupted.load(Ordering::Relaxed) && !handle.is_cancelled() {
            handle.cancel();
        }
    }
    eprintln!();

    if handle.is_cancelled() {
        eprintln!("{}", "Scan cancelled".yellow());
        return Ok(());
    }

    let taken = result.lock().take();
    match taken {
        Some(Ok(entries)) => {
            ensure_accessible(path, &entries)?;
            print_entries(path, &entries, limit);
            Ok(())
        }
        Some(Err(message)) => bail!("Scan failed: {}", message),
        None => bail!("Scan finished without a result"),
    }
}

fn scan_batch(
    pool: &WorkerPool,
    event_loop: &EventLoop,
    path: &Path,
    interrupted: &AtomicBool,
    limit: usize,
) -> Result<()> {
    let totals: Arc<Mutex<Vec<DirEntry>>> = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicUsize::new(0));

    let totals_sink = Arc::clone(&totals);
    let finished_count = Arc::clone(&finished);
    let batch = ScanBatch::start(pool, path, move |dir, event| match event {
        TaskEvent::Result(entries) => {
            totals_sink.lock().push(DirEntry {
                name: dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: dir.to_path_buf(),
                size_bytes: entries.iter().map(|e| e.size_bytes).sum(),
                item_count: entries.iter().map(|e| e.item_count).sum(),
                is_dir: true,
                is_accessible: !entries.iter().any(|e| !e.is_accessible),
            });
        }
        TaskEvent::Error(message) => log::warn!("Scan of {} failed: {}", dir.display(), message),
        TaskEvent::Finished => {
            finished_count.fetch_add(1, Ordering::AcqRel);
        }
        TaskEvent::Progress(_) => {}
    })
    .with_context(|| format!("Failed to list {}", path.display()))?;

    eprintln!("Scanning {} subdirectories...", batch.len());
    while finished.load(Ordering::Acquire) < batch.len() {
        event_loop.run_for(TICK);
        if interrupted.load(Ordering::Relaxed) && !batch.is_cancelled() {
            batch.cancel();
        }
    }

    if batch.is_cancelled() {
        eprintln!("{}", "Scan cancelled".yellow());
        return Ok(());
    }

    let mut entries = std::mem::take(&mut *totals.lock());
    entries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    print_entries(path, &entries, limit);
    Ok(())
}

fn print_entries(root: &Path, entries: &[DirEntry], limit: usize) {
    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!(
        "{} {} ({})",
        "Contents of".cyan().bold(),
        root.display(),
        format_size(total, BINARY)
    );

    for entry in entries.iter().take(limit) {
        let size = format!("{:>10}", format_size(entry.size_bytes, BINARY));
        let name = if entry.is_dir {
            format!("{}/", entry.name).blue().bold()
        } else {
            entry.name.normal()
        };
        if entry.is_accessible {
            println!("{}  {}", size, name);
        } else {
            println!("{}  {} {}", size.dimmed(), name, "(inaccessible)".red());
        }
    }

    if entries.len() > limit {
        println!("{}", format!("... {} more", entries.len() - limit).dimmed());
    }
}
