//! Directory size scanning.
//!
//! [`scan_directory`] lists the immediate children of a directory with their
//! recursive sizes. It is written as a cancellable collector: it polls the
//! [`TaskContext`] between children and every [`CANCEL_CHECK_INTERVAL`]
//! entries while recursing, and reports progress as it goes.
//!
//! # Examples
//!
//! ```no_run
//! use sysdash::core::storage::scan_directory;
//! use sysdash::core::tasks::TaskContext;
//! use std::path::Path;
//!
//! let entries = scan_directory(Path::new("."), &TaskContext::detached())?;
//! for entry in entries {
//!     println!("{}: {} bytes", entry.name, entry.size_bytes);
//! }
//! # Ok::<(), sysdash::SysdashError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::tasks::{CancelHandle, CancellationToken, TaskContext, TaskEvent, WorkerPool};
use crate::error::{Result, SysdashError};

/// Entries visited between two cancellation checks while recursing.
pub const CANCEL_CHECK_INTERVAL: usize = 100;
/// Children processed between two progress reports.
const PROGRESS_INTERVAL: usize = 50;

pub const ACCESS_DENIED_NAME: &str = "(Access denied)";

/// One immediate child of a scanned directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    /// Total size in bytes (recursive for directories).
    pub size_bytes: u64,
    /// Files counted (1 for a plain file).
    pub item_count: u64,
    pub is_dir: bool,
    pub is_accessible: bool,
}

/// Scan `path`'s children, largest first.
///
/// An unreadable `path` yields a single entry named
/// [`ACCESS_DENIED_NAME`]. Children that cannot be inspected are listed with
/// `is_accessible = false` and size 0. Unreadable entries deeper down are
/// skipped. Returns `SysdashError::Cancelled` once `ctx` is cancelled.
pub fn scan_directory(path: &Path, ctx: &TaskContext) -> Result<Vec<DirEntry>> {
    let children: Vec<fs::DirEntry> = match fs::read_dir(path) {
        Ok(iter) => iter.flatten().collect(),
        Err(err) => {
            log::debug!("Cannot read {}: {}", path.display(), err);
            return Ok(vec![DirEntry {
                name: ACCESS_DENIED_NAME.to_string(),
                path: path.to_path_buf(),
                size_bytes: 0,
                item_count: 0,
                is_dir: false,
                is_accessible: false,
            }]);
        }
    };

    let total = children.len();
    let mut entries = Vec::with_capacity(total);

    for (i, child) in children.into_iter().enumerate() {
        ctx.check_cancelled()?;

        if i % PROGRESS_INTERVAL == 0 && total > 0 {
            ctx.report_progress((i * 100 / total) as u8);
        }

        let name = child.file_name().to_string_lossy().to_string();
        let child_path = child.path();

        // file_type() does not follow symlinks.
        let entry = match child.file_type() {
            Ok(file_type) if file_type.is_dir() => {
                let (size_bytes, item_count) = dir_size(&child_path, ctx)?;
                DirEntry {
                    name,
                    path: child_path,
                    size_bytes,
                    item_count,
                    is_dir: true,
                    is_accessible: true,
                }
            }
            Ok(_) => {
                let size_bytes = fs::symlink_metadata(&child_path)
                    .map(|meta| meta.len())
                    .unwrap_or(0);
                DirEntry {
                    name,
                    path: child_path,
                    size_bytes,
                    item_count: 1,
                    is_dir: false,
                    is_accessible: true,
                }
            }
            Err(err) => {
                log::debug!("Cannot inspect {}: {}", child_path.display(), err);
                DirEntry {
                    name,
                    path: child_path,
                    size_bytes: 0,
                    item_count: 0,
                    is_dir: false,
                    is_accessible: false,
                }
            }
        };
        entries.push(entry);
    }

    ctx.report_progress(100);
    entries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Recursive size and file count of `dir`, skipping what cannot be read.
fn dir_size(dir: &Path, ctx: &TaskContext) -> Result<(u64, u64)> {
    let Ok(iter) = fs::read_dir(dir) else {
        return Ok((0, 0));
    };

    let mut total_size = 0;
    let mut total_count = 0;

    for (i, entry) in iter.flatten().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 {
            ctx.check_cancelled()?;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let (size, count) = dir_size(&entry.path(), ctx)?;
            total_size += size;
            total_count += count;
        } else if let Ok(meta) = entry.metadata() {
            total_size += meta.len();
            total_count += 1;
        }
    }

    Ok((total_size, total_count))
}

type BatchHandler = Arc<dyn Fn(&Path, TaskEvent<Vec<DirEntry>>) + Send + Sync>;

/// One cancellable scan per subdirectory of a root, cancelled together.
#[derive(Debug)]
pub struct ScanBatch {
    root: PathBuf,
    token: CancellationToken,
    scans: Vec<(PathBuf, CancelHandle)>,
}

impl ScanBatch {
    /// Start scanning every subdirectory of `root`.
    ///
    /// `on_event` runs on the presentation thread with the scanned
    /// subdirectory and the task's event. Fails if `root` cannot be listed.
    pub fn start<H>(pool: &WorkerPool, root: &Path, on_event: H) -> Result<Self>
    where
        H: Fn(&Path, TaskEvent<Vec<DirEntry>>) + Send + Sync + 'static,
    {
        let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        dirs.sort();

        let token = CancellationToken::new();
        let handler: BatchHandler = Arc::new(on_event);

        let scans = dirs
            .into_iter()
            .map(|dir| {
                let scan_path = dir.clone();
                let event_path = dir.clone();
                let handler = Arc::clone(&handler);
                let handle = pool.submit_cancellable_with_token(
                    token.child_token(),
                    move |ctx| Ok(scan_directory(&scan_path, ctx)?),
                    move |event| handler(&event_path, event),
                );
                (dir, handle)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Scan batch for {} started with {} tasks",
            root.display(),
            scans.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            token,
            scans,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.scans.iter().map(|(path, _)| path.as_path())
    }

    /// Cancel every scan in the batch.
    pub fn cancel(&self) {
        log::debug!("Cancelling scan batch for {}", self.root.display());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// All loaders have returned.
    pub fn is_completed(&self) -> bool {
        self.scans.iter().all(|(_, handle)| handle.is_completed())
    }
}

impl Drop for ScanBatch {
    fn drop(&mut self) {
        if !self.is_completed() {
            self.token.cancel();
        }
    }
}

/// `Err` if `entries` describes an unreadable directory.
pub fn ensure_accessible(path: &Path, entries: &[DirEntry]) -> Result<()> {
    match entries {
        [only] if !only.is_accessible && only.name == ACCESS_DENIED_NAME => Err(
            SysdashError::collector(format!("access denied: {}", path.display())),
        ),
        _ => Ok(()),
    }
}
