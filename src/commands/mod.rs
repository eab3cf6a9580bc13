// Command handlers module
pub mod config;
pub mod scan;
pub mod snapshot;
pub mod watch;

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::tasks::{dispatch, EventLoop, WorkerPool};
use crate::core::Config;

/// Worker pool sized from the user's config, with its presentation loop.
pub(crate) fn start_pool(config: &Config) -> Result<(WorkerPool, EventLoop)> {
    let (dispatcher, event_loop) = dispatch::channel();
    let pool = WorkerPool::with_config(dispatcher, config.pool_config())
        .context("Failed to start worker pool")?;
    Ok((pool, event_loop))
}

/// Flag raised by Ctrl+C.
pub(crate) fn interrupt_flag(message: &'static str) -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_clone = Arc::clone(&flag);

    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", message.yellow().bold());
        flag_clone.store(true, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    Ok(flag)
}
