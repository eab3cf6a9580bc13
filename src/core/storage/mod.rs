//! Storage inspection: directory size scans.

mod dir_scan;

pub use dir_scan::{
    ensure_accessible, scan_directory, DirEntry, ScanBatch, ACCESS_DENIED_NAME,
    CANCEL_CHECK_INTERVAL,
};
