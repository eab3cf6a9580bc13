// Core runtime: task execution, caching and metric collection

pub mod cache;
pub mod config;
pub mod storage;
pub mod system_monitor;
pub mod tasks;

// Re-export commonly used items
pub use cache::{Cache, CacheEvent, CacheOptions, CacheState};
pub use config::Config;
pub use tasks::{TaskEvent, WorkerPool};
