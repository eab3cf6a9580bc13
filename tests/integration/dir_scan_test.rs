// Integration tests for directory scans run as cancellable tasks

use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysdash::core::storage::{scan_directory, DirEntry, ScanBatch};
use sysdash::core::tasks::{dispatch, TaskEvent, WorkerPool};
use tempfile::TempDir;

fn build_tree(root: &std::path::Path) {
    for (dir, files) in [("photos", 3usize), ("music", 2), ("docs", 1)] {
        let dir_path = root.join(dir);
        fs::create_dir(&dir_path).unwrap();
        for i in 0..files {
            fs::write(dir_path.join(format!("f{i}.dat")), vec![0u8; 1000 * (i + 1)]).unwrap();
        }
    }
    fs::write(root.join("readme.txt"), "hello").unwrap();
}

#[test]
fn test_scan_as_cancellable_task() {
    let temp_dir = TempDir::new().unwrap();
    build_tree(temp_dir.path());

    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let result: Arc<Mutex<Option<Vec<DirEntry>>>> = Arc::new(Mutex::new(None));
    let progress = Arc::new(Mutex::new(Vec::new()));

    let root = temp_dir.path().to_path_buf();
    let result_slot = Arc::clone(&result);
    let progress_sink = Arc::clone(&progress);
    pool.submit_cancellable(
        move |ctx| Ok(scan_directory(&root, ctx)?),
        move |event| match event {
            TaskEvent::Result(entries) => *result_slot.lock() = Some(entries),
            TaskEvent::Progress(percent) => progress_sink.lock().push(percent),
            _ => {}
        },
    );

    assert!(event_loop.run_until(Duration::from_secs(5), || result.lock().is_some()));

    let entries = result.lock().take().unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["photos", "music", "docs", "readme.txt"]);
    assert_eq!(entries[0].size_bytes, 6000);
    assert_eq!(entries[0].item_count, 3);
    assert_eq!(progress.lock().last(), Some(&100));
}

#[test]
fn test_batch_scans_each_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    build_tree(temp_dir.path());

    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let results: Arc<Mutex<Vec<(PathBuf, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(AtomicUsize::new(0));

    let results_sink = Arc::clone(&results);
    let finished_count = Arc::clone(&finished);
    let batch = ScanBatch::start(&pool, temp_dir.path(), move |dir, event| match event {
        TaskEvent::Result(entries) => results_sink
            .lock()
            .push((dir.to_path_buf(), entries.iter().map(|e| e.size_bytes).sum())),
        TaskEvent::Finished => {
            finished_count.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    })
    .unwrap();

    assert_eq!(batch.len(), 3);
    assert!(event_loop.run_until(Duration::from_secs(5), || {
        finished.load(Ordering::SeqCst) == 3
    }));
    assert!(batch.is_completed());

    let mut sizes = results.lock().clone();
    sizes.sort();
    assert_eq!(
        sizes,
        vec![
            (temp_dir.path().join("docs"), 1000),
            (temp_dir.path().join("music"), 3000),
            (temp_dir.path().join("photos"), 6000),
        ]
    );
}

#[test]
fn test_cancelled_batch_delivers_no_results() {
    let temp_dir = TempDir::new().unwrap();
    build_tree(temp_dir.path());

    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();
    let results = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let results_count = Arc::clone(&results);
    let finished_count = Arc::clone(&finished);
    let batch = ScanBatch::start(&pool, temp_dir.path(), move |_, event| match event {
        TaskEvent::Result(_) => {
            results_count.fetch_add(1, Ordering::SeqCst);
        }
        TaskEvent::Finished => {
            finished_count.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    })
    .unwrap();
    // Nothing is delivered before the loop runs, so cancelling now mutes every scan.
    batch.cancel();

    assert!(event_loop.run_until(Duration::from_secs(5), || {
        finished.load(Ordering::SeqCst) == 3
    }));
    assert_eq!(results.load(Ordering::SeqCst), 0);
    assert!(batch.is_cancelled());
}

#[test]
fn test_batch_on_missing_root_fails() {
    let temp_dir = TempDir::new().unwrap();
    let (dispatcher, _event_loop) = dispatch::channel();
    let pool = WorkerPool::new(dispatcher).unwrap();

    let result = ScanBatch::start(&pool, &temp_dir.path().join("missing"), |_, _| {});
    assert!(result.is_err());
}
