//! Fixed-interval polling task.
//!
//! The loop runs the loader on a blocking thread, delivers the outcome, then
//! waits for `interval` or a stop request, whichever comes first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{run_guarded, Notifier, Outcome, TaskEvent, WorkerPool};
use crate::error::{Result, SysdashError};

/// Signalled once the loop has observably exited.
#[derive(Default)]
struct ExitLatch {
    exited: Mutex<bool>,
    cond: Condvar,
}

impl ExitLatch {
    fn open(&self) {
        *self.exited.lock() = true;
        self.cond.notify_all();
    }

    fn is_open(&self) -> bool {
        *self.exited.lock()
    }

    /// Wait up to `timeout`; returns whether the latch opened.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut exited = self.exited.lock();
        while !*exited {
            if self.cond.wait_until(&mut exited, deadline).timed_out() {
                return *exited;
            }
        }
        true
    }
}

struct PeriodicShared {
    stopping: AtomicBool,
    finished_sent: AtomicBool,
    iterations: AtomicU64,
    exit: ExitLatch,
}

impl PeriodicShared {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Emit `Finished` unless someone already did.
    fn finish<T: Send + 'static>(&self, notifier: &Notifier<T>) {
        if !self.finished_sent.swap(true, Ordering::AcqRel) {
            notifier.emit(TaskEvent::Finished);
        }
    }
}

/// Owner of a running periodic task.
///
/// Dropping the handle requests a stop without waiting for it.
pub struct PeriodicHandle {
    id: u64,
    interval: Duration,
    grace: Duration,
    stop_tx: watch::Sender<bool>,
    shared: Arc<PeriodicShared>,
    join: Option<JoinHandle<()>>,
    on_forced_finish: Box<dyn Fn() + Send + Sync>,
}

impl PeriodicHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of loader invocations that have completed so far.
    pub fn iterations(&self) -> u64 {
        self.shared.iterations.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some() && !self.shared.exit.is_open()
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// Blocks the calling thread for at most the pool's `stop_grace`; call it
    /// from a plain thread, not from inside an async task. Once this returns no
    /// further `Result`/`Error` events are delivered. If the loop does not exit
    /// in time (a loader is stuck) it is aborted, `Finished` is emitted on its
    /// behalf and `SysdashError::Timeout` is returned. The stuck loader itself
    /// keeps running detached; its result is discarded.
    pub fn stop(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };

        self.shared.stopping.store(true, Ordering::Release);
        // Receiver gone means the loop already exited.
        let _ = self.stop_tx.send(true);

        if self.shared.exit.wait(self.grace) {
            log::debug!("Periodic task #{} stopped", self.id);
            return Ok(());
        }

        join.abort();
        (self.on_forced_finish)();
        log::error!(
            "Periodic task #{} did not exit within {:?}; loop aborted",
            self.id,
            self.grace
        );
        Err(SysdashError::timeout(
            format!("stopping periodic task #{}", self.id),
            self.grace,
        ))
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shared.stopping.store(true, Ordering::Release);
            let _ = self.stop_tx.send(true);
        }
    }
}

impl std::fmt::Debug for PeriodicHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicHandle")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("iterations", &self.iterations())
            .field("running", &self.is_running())
            .finish()
    }
}

impl WorkerPool {
    /// Run `loader` every `interval` until the returned handle is stopped.
    ///
    /// Each iteration emits `Result` or `Error`; `Finished` follows exactly
    /// once after the loop ends. The first run starts immediately.
    pub fn start_periodic<T, F, H>(&self, interval: Duration, loader: F, on_event: H) -> PeriodicHandle
    where
        T: Send + 'static,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
        H: FnMut(TaskEvent<T>) + Send + 'static,
    {
        let id = self.next_task_id();
        let notifier = Notifier::new(self.dispatcher().clone(), on_event);
        let shared = Arc::new(PeriodicShared {
            stopping: AtomicBool::new(false),
            finished_sent: AtomicBool::new(false),
            iterations: AtomicU64::new(0),
            exit: ExitLatch::default(),
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        log::debug!("Periodic task #{} started (interval {:?})", id, interval);

        let join = self.spawn(run_loop(
            id,
            interval,
            Arc::new(loader),
            notifier.clone(),
            Arc::clone(&shared),
            stop_rx,
            self.clone(),
        ));

        let forced_shared = Arc::clone(&shared);
        PeriodicHandle {
            id,
            interval,
            grace: self.config().stop_grace,
            stop_tx,
            shared,
            join: Some(join),
            on_forced_finish: Box::new(move || forced_shared.finish(&notifier)),
        }
    }
}

/// Log level for an iteration failure: the first one after a success warns,
/// repeats stay at debug.
fn failure_level(previous_failed: bool) -> log::Level {
    if previous_failed {
        log::Level::Debug
    } else {
        log::Level::Warn
    }
}

async fn run_loop<T, F>(
    id: u64,
    interval: Duration,
    loader: Arc<F>,
    notifier: Notifier<T>,
    shared: Arc<PeriodicShared>,
    mut stop_rx: watch::Receiver<bool>,
    pool: WorkerPool,
) where
    T: Send + 'static,
    F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
{
    let mut failing = false;
    loop {
        if shared.is_stopping() {
            break;
        }

        let call = Arc::clone(&loader);
        let active = pool.track_active();
        let outcome = match pool
            .blocking_handle()
            .spawn_blocking(move || run_guarded(|| (*call)()))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Failed(format!("loader task failed: {err}")),
        };
        drop(active);
        shared.iterations.fetch_add(1, Ordering::AcqRel);

        if shared.is_stopping() {
            break;
        }

        match outcome {
            Outcome::Failed(ref message) => {
                log::log!(
                    failure_level(failing),
                    "Periodic task #{} iteration failed: {}",
                    id,
                    message
                );
                failing = true;
            }
            _ => failing = false,
        }

        let gate = Arc::clone(&shared);
        notifier.emit_outcome(outcome, move || !gate.is_stopping());

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // Err means the handle was dropped, which is a stop request too.
            _ = stop_rx.changed() => break,
        }
    }

    shared.finish(&notifier);
    shared.exit.open();
    // Keep the pool alive until the loop is done with it.
    drop(pool);
    log::trace!("Periodic task #{} loop exited", id);
}
