//! Tokio-backed worker pool.
//!
//! Loaders are blocking calls, so they run on the runtime's blocking thread
//! pool; the async worker threads only drive timers and periodic loops.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, Runtime};

use super::{run_guarded, Dispatcher, Notifier, Outcome, TaskEvent};
use crate::error::{Result, SysdashError};

/// Sizing and shutdown behaviour of a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Async threads driving timers and periodic loops.
    pub worker_threads: usize,
    /// Upper bound on concurrently running loaders. `None` leaves the pool
    /// effectively unbounded (tokio's blocking-pool ceiling).
    pub max_blocking_threads: Option<usize>,
    /// How long [`PeriodicHandle::stop`](super::PeriodicHandle::stop) waits
    /// before aborting the loop.
    pub stop_grace: Duration,
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: None,
            stop_grace: Duration::from_secs(1),
            thread_name: "sysdash-worker".to_string(),
        }
    }
}

struct PoolInner {
    runtime: Option<Runtime>,
    handle: Handle,
    dispatcher: Dispatcher,
    config: PoolConfig,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // The last handle may be released on one of the pool's own threads,
        // where a blocking runtime shutdown would deadlock.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Executes tasks off the presentation thread and routes their notifications
/// back through the pool's [`Dispatcher`].
///
/// Cloning is cheap; every clone submits to the same runtime.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool with the default configuration.
    pub fn new(dispatcher: Dispatcher) -> Result<Self> {
        Self::with_config(dispatcher, PoolConfig::default())
    }

    pub fn with_config(dispatcher: Dispatcher, config: PoolConfig) -> Result<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .worker_threads(config.worker_threads.max(1))
            .enable_time()
            .thread_name(config.thread_name.clone());

        if let Some(max) = config.max_blocking_threads {
            builder.max_blocking_threads(max.max(1));
        }

        let runtime = builder
            .build()
            .map_err(|e| SysdashError::pool(format!("failed to start runtime: {e}")))?;
        let handle = runtime.handle().clone();

        log::debug!(
            "Worker pool started ({} async threads, blocking limit {:?})",
            config.worker_threads,
            config.max_blocking_threads
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                runtime: Some(runtime),
                handle,
                dispatcher,
                config,
                next_id: AtomicU64::new(1),
                active: Arc::new(AtomicUsize::new(0)),
            }),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Loaders currently executing or queued for a blocking thread.
    pub fn active_tasks(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Run `loader` once on a worker thread.
    ///
    /// `on_event` runs on the presentation thread and receives either
    /// `Result` or `Error`, then exactly one `Finished`. Never blocks.
    /// Returns the task id used in log output.
    pub fn submit<T, F, H>(&self, loader: F, on_event: H) -> u64
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        H: FnMut(TaskEvent<T>) + Send + 'static,
    {
        let id = self.next_task_id();
        let notifier = Notifier::new(self.inner.dispatcher.clone(), on_event);
        let active = self.track_active();

        log::trace!("Task #{} submitted", id);

        self.inner.handle.spawn_blocking(move || {
            let outcome = run_guarded(loader);
            drop(active);

            if let Outcome::Failed(ref message) = outcome {
                log::warn!("Task #{} failed: {}", id, message);
            }

            notifier.emit_outcome(outcome, || true);
            notifier.emit(TaskEvent::Finished);
            log::trace!("Task #{} finished", id);
        });

        id
    }

    /// Post `job` to the presentation thread once `delay` has elapsed.
    pub fn post_after<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let dispatcher = self.inner.dispatcher.clone();
        self.inner.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.post(job);
        });
    }

    pub(crate) fn spawn<Fut>(&self, future: Fut) -> tokio::task::JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    pub(crate) fn blocking_handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub(crate) fn next_task_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn track_active(&self) -> ActiveGuard {
        ActiveGuard::new(Arc::clone(&self.inner.active))
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

/// Counts one loader as active for as long as it lives.
pub(crate) struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
